//! 도메인 타입 - 스모크 테스트 전반에서 사용하는 기본 타입 정의

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// SQL 방언
///
/// 프로비저닝 서비스가 지원하는 데이터베이스 종류입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// MySQL 8
    Mysql,
    /// Microsoft SQL Server
    Mssql,
}

impl Dialect {
    /// 지원하는 모든 방언 (설정 테이블 순서)
    pub const ALL: [Dialect; 2] = [Dialect::Mysql, Dialect::Mssql];

    /// 프로비저닝 요청 본문에 들어가는 이름
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Mssql => "mssql",
        }
    }

    /// 사람이 읽기 위한 표시 이름
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Mysql => "MySQL",
            Self::Mssql => "MSSQL",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Dialect {
    type Err = ConfigError;

    /// 대소문자를 구분하지 않으며 서비스의 별칭(`mariadb`, `sqlserver`)도 허용합니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "mssql" | "sqlserver" => Ok(Self::Mssql),
            other => Err(ConfigError::InvalidValue {
                field: "dialect".to_owned(),
                reason: format!("unsupported dialect '{other}' (expected: mysql, mssql)"),
            }),
        }
    }
}

/// 프로비저닝된 임시 데이터베이스 핸들
///
/// 프로비저닝 호출로만 생성되며 하나의 실행에서 독점적으로 소유됩니다.
/// `Clone`을 구현하지 않아 실행 간 재사용이나 공유가 불가능하고,
/// 삭제 호출에 값으로 넘겨져 소비됩니다.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct DatabaseHandle {
    /// 서비스가 발급한 불투명 ID
    pub id: String,
    /// 데이터베이스 방언
    pub dialect: Dialect,
    /// 생성 시점에 서비스가 보고한 상태
    pub status: String,
    /// 백업에서 복원되었는지 여부
    pub restored: bool,
}

impl DatabaseHandle {
    /// 새 핸들을 생성합니다.
    pub fn new(id: impl Into<String>, dialect: Dialect, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dialect,
            status: status.into(),
            restored: false,
        }
    }
}

/// 쿼리 결과의 행/열 형태가 맞지 않을 때의 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryShapeError {
    /// 행의 길이가 컬럼 수와 다름
    #[error("row {row} has {actual} values but {expected} columns were reported")]
    ArityMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// 단일 SQL 문 실행 결과
///
/// 모든 행은 `columns`와 같은 길이를 가집니다. 행을 반환하지 않는 문(DDL/DML)은
/// 빈 `columns`와 `rows`를 가집니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    /// 컬럼 이름 (순서 유지)
    pub columns: Vec<String>,
    /// 행 목록
    pub rows: Vec<Vec<Value>>,
    /// 영향받은 행 수 (서비스가 보고한 경우)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    /// 서비스가 전달한 부가 메시지
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl QueryResult {
    /// 행/열 형태를 검증하며 결과를 생성합니다.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, QueryShapeError> {
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(QueryShapeError::ArityMismatch {
                    row: idx,
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }
        Ok(Self {
            columns,
            rows,
            affected_rows: None,
            messages: Vec::new(),
        })
    }

    /// 행을 반환하지 않는 문의 결과
    pub fn empty() -> Self {
        Self::default()
    }

    /// 행 수
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// 스모크 테스트 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// 기대한 행 수와 일치
    Passed,
    /// 기대한 행 수와 불일치
    Failed,
}

impl Verdict {
    /// 기대 행 수와 실제 행 수를 비교해 판정합니다.
    pub fn from_counts(expected: usize, actual: usize) -> Self {
        if expected == actual {
            Self::Passed
        } else {
            Self::Failed
        }
    }

    /// 판정에 대응하는 프로세스 종료 코드
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Passed => 0,
            Self::Failed => 1,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}
