use std::env;

/// 애플리케이션 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub api_base: String,
    pub api_key: String,
    pub api_secret: String,
    pub account_ref: String,
    /// 재시도 소진 후 해당 윈도우를 건너뛸지 여부 (false면 피드 전체 중단)
    pub skip_failed_windows: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://coinledger.db?mode=rwc".to_string(),
            api_base: "https://api.binance.com".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            account_ref: "primary".to_string(),
            skip_failed_windows: true,
        }
    }
}

impl Config {
    /// .env 및 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let d = Config::default();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(d.database_url),
            api_base: env::var("BINANCE_API_BASE").unwrap_or(d.api_base),
            api_key: env::var("BINANCE_API_KEY").unwrap_or(d.api_key),
            api_secret: env::var("BINANCE_API_SECRET").unwrap_or(d.api_secret),
            account_ref: env::var("ACCOUNT_REF").unwrap_or(d.account_ref),
            skip_failed_windows: env::var("SKIP_FAILED_WINDOWS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(d.skip_failed_windows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let c = Config::default();
        assert_eq!(c.account_ref, "primary");
        assert!(c.skip_failed_windows);
    }
}
