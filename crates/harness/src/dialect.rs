//! 방언별 SQL 차이 테이블
//!
//! 시나리오는 방언과 무관한 하나의 흐름이고, 방언마다 다른 것은
//! 컬럼 타입 조각과 기본 프로비저닝 타임아웃뿐입니다.
//! 새 방언은 [`DIALECT_TABLE`]에 행을 추가하는 것으로 지원합니다.

use std::time::Duration;

use dbsmoke_core::types::Dialect;

/// 한 방언의 SQL 조각과 기본값
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectSql {
    /// 대상 방언
    pub dialect: Dialect,
    /// 자동 증가 정수 기본 키 컬럼 정의
    pub identity_column: &'static str,
    /// 가변 길이 문자열 타입
    pub text_type: &'static str,
    /// 타임스탬프 타입
    pub timestamp_type: &'static str,
    /// 타임스탬프 기본값 표현식
    pub timestamp_default: &'static str,
    /// 설정에서 덮어쓰지 않을 때의 프로비저닝 타임아웃
    pub provision_timeout: Duration,
}

/// 지원 방언 테이블
pub const DIALECT_TABLE: &[DialectSql] = &[
    DialectSql {
        dialect: Dialect::Mysql,
        identity_column: "INT AUTO_INCREMENT PRIMARY KEY",
        text_type: "VARCHAR(255)",
        timestamp_type: "TIMESTAMP",
        timestamp_default: "CURRENT_TIMESTAMP",
        provision_timeout: Duration::from_secs(120),
    },
    DialectSql {
        dialect: Dialect::Mssql,
        identity_column: "INT IDENTITY(1,1) PRIMARY KEY",
        text_type: "NVARCHAR(255)",
        timestamp_type: "DATETIME2",
        timestamp_default: "GETDATE()",
        provision_timeout: Duration::from_secs(180),
    },
];

/// 방언의 테이블 행을 찾습니다.
pub fn lookup(dialect: Dialect) -> Option<&'static DialectSql> {
    DIALECT_TABLE.iter().find(|row| row.dialect == dialect)
}

/// 방언의 기본 프로비저닝 타임아웃
///
/// 테이블에 없는 방언은 가장 긴 기본값을 사용합니다.
pub fn default_provision_timeout(dialect: Dialect) -> Duration {
    lookup(dialect)
        .map(|row| row.provision_timeout)
        .unwrap_or_else(|| {
            DIALECT_TABLE
                .iter()
                .map(|row| row.provision_timeout)
                .max()
                .unwrap_or(Duration::from_secs(180))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_dialect_has_a_table_row() {
        for dialect in Dialect::ALL {
            assert!(lookup(dialect).is_some(), "missing row for {dialect}");
        }
    }

    #[test]
    fn table_rows_are_unique() {
        for (i, row) in DIALECT_TABLE.iter().enumerate() {
            for other in &DIALECT_TABLE[i + 1..] {
                assert_ne!(row.dialect, other.dialect);
            }
        }
    }

    #[test]
    fn mysql_fragments() {
        let row = lookup(Dialect::Mysql).unwrap();
        assert_eq!(row.identity_column, "INT AUTO_INCREMENT PRIMARY KEY");
        assert_eq!(row.text_type, "VARCHAR(255)");
        assert_eq!(row.timestamp_type, "TIMESTAMP");
        assert_eq!(row.timestamp_default, "CURRENT_TIMESTAMP");
    }

    #[test]
    fn mssql_fragments() {
        let row = lookup(Dialect::Mssql).unwrap();
        assert_eq!(row.identity_column, "INT IDENTITY(1,1) PRIMARY KEY");
        assert_eq!(row.text_type, "NVARCHAR(255)");
        assert_eq!(row.timestamp_type, "DATETIME2");
        assert_eq!(row.timestamp_default, "GETDATE()");
    }

    #[test]
    fn mssql_gets_longer_provision_timeout() {
        assert_eq!(
            default_provision_timeout(Dialect::Mysql),
            Duration::from_secs(120)
        );
        assert_eq!(
            default_provision_timeout(Dialect::Mssql),
            Duration::from_secs(180)
        );
    }
}
