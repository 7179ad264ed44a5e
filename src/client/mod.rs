//! 서명 API 클라이언트
//!
//! 거래소 REST API에 서명/비서명 요청을 보내고, 실패를 재시도 가능 여부에 따라
//! 분류합니다. 429 계열은 Retry-After 메타데이터와 함께 별도 분류됩니다.

pub mod binance;
pub mod nonce;

use serde_json::Value;

pub use binance::BinanceSignedClient;
pub use nonce::NonceCounter;

/// 순서가 유지되는 요청 파라미터 (서명 대상 쿼리 문자열의 순서 보존)
pub type Params = Vec<(String, String)>;

/// 파라미터 추가 헬퍼
pub fn param(params: &mut Params, key: &str, value: impl ToString) {
    params.push((key.to_string(), value.to_string()));
}

/// API 호출 실패 분류
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// 요청 한도 초과. 백오프 후 재시도 가능.
    #[error("요청 한도 초과 (Retry-After: {retry_after:?})")]
    RateLimited { retry_after: Option<String> },
    /// 일시적 네트워크 오류. 재시도 가능.
    #[error("네트워크 오류: {0}")]
    Network(String),
    /// 유효하지 않은 심볼/파라미터. 해당 피드·심볼에 한해 영구 실패, 건너뛰고 계속.
    #[error("유효하지 않은 심볼 또는 파라미터: {0}")]
    InvalidSymbol(String),
    /// 인증/서명 오류. 실행 전체 중단.
    #[error("인증/서명 오류: {0}")]
    Auth(String),
    /// 그 외 API 오류
    #[error("API 오류 (code {code}): {msg}")]
    Api { code: i64, msg: String },
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(e.to_string())
    }
}

impl ApiError {
    /// 백오프 후 재시도할 가치가 있는 오류인지
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. } | ApiError::Network(_))
    }

    pub fn retry_after(&self) -> Option<&str> {
        match self {
            ApiError::RateLimited { retry_after } => retry_after.as_deref(),
            _ => None,
        }
    }
}

/// 서명 API 클라이언트 인터페이스
///
/// params는 순서가 유지되는 키-값 목록입니다. 테스트에서는 고정 응답을 돌려주는
/// 가짜 구현으로 대체합니다.
#[allow(async_fn_in_trait)]
pub trait SignedApiClient {
    /// 서명 GET
    async fn get(&self, path: &str, params: &Params) -> Result<Value, ApiError>;
    /// 서명 POST
    async fn post(&self, path: &str, params: &Params) -> Result<Value, ApiError>;
    /// 비서명(공개) GET
    async fn get_public(&self, path: &str, params: &Params) -> Result<Value, ApiError>;
}
