use hmac::{Hmac, Mac};
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use super::{ApiError, NonceCounter, Params, SignedApiClient};

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW_MS: u64 = 5_000;

/// Binance 스타일 서명 클라이언트
///
/// 쿼리 문자열에 timestamp/recvWindow를 붙인 뒤 전체를 HMAC-SHA256으로 서명하고,
/// `X-MBX-APIKEY` 헤더로 전송합니다. 타임스탬프는 논스 카운터가 공급하므로 같은
/// 밀리초의 연속 요청도 서로 다른 서명을 갖습니다.
pub struct BinanceSignedClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    nonce: NonceCounter,
}

/// Binance 오류 응답 본문
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    msg: String,
}

impl BinanceSignedClient {
    pub fn new(base_url: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            nonce: NonceCounter::new(),
        }
    }

    fn query_string(params: &Params) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// 서명 대상 쿼리 문자열 구성 + HMAC 서명
    fn signed_query(&self, params: &Params) -> Result<String, ApiError> {
        let mut qs = Self::query_string(params);
        if !qs.is_empty() {
            qs.push('&');
        }
        qs.push_str(&format!(
            "timestamp={}&recvWindow={}",
            self.nonce.next(),
            RECV_WINDOW_MS
        ));

        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| ApiError::Auth(format!("HMAC 키 오류: {}", e)))?;
        mac.update(qs.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", qs, signature))
    }

    /// 응답을 상태 코드와 본문 코드로 분류
    async fn classify(resp: reqwest::Response) -> Result<Value, ApiError> {
        let status = resp.status();

        // 429(한도 초과)와 418(차단 경고)은 재시도 대상
        if status.as_u16() == 429 || status.as_u16() == 418 {
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            return Err(ApiError::RateLimited { retry_after });
        }

        let body = resp.text().await?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ErrorBody>(&body) {
                return Err(classify_code(err.code, err.msg));
            }
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ApiError::Auth(format!("HTTP {}: {}", status, body)));
            }
            return Err(ApiError::Api {
                code: status.as_u16() as i64,
                msg: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Api {
            code: 0,
            msg: format!("응답 파싱 실패: {}", e),
        })
    }
}

/// Binance 오류 코드 분류
fn classify_code(code: i64, msg: String) -> ApiError {
    match code {
        // -1121: 유효하지 않은 심볼
        -1121 => ApiError::InvalidSymbol(msg),
        // -1022: 서명 불일치, -2014: API 키 형식 오류, -2015: 키/IP/권한 거부
        -1022 | -2014 | -2015 => ApiError::Auth(msg),
        _ => ApiError::Api { code, msg },
    }
}

impl SignedApiClient for BinanceSignedClient {
    async fn get(&self, path: &str, params: &Params) -> Result<Value, ApiError> {
        let url = format!("{}{}?{}", self.base_url, path, self.signed_query(params)?);
        debug!("GET {}", path);
        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Self::classify(resp).await
    }

    async fn post(&self, path: &str, params: &Params) -> Result<Value, ApiError> {
        let url = format!("{}{}?{}", self.base_url, path, self.signed_query(params)?);
        debug!("POST {}", path);
        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Self::classify(resp).await
    }

    async fn get_public(&self, path: &str, params: &Params) -> Result<Value, ApiError> {
        let qs = Self::query_string(params);
        let url = if qs.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, qs)
        };
        debug!("GET(public) {}", path);
        let resp = self.http.get(&url).send().await?;
        Self::classify(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_classification() {
        assert!(matches!(
            classify_code(-1121, "Invalid symbol.".into()),
            ApiError::InvalidSymbol(_)
        ));
        assert!(matches!(
            classify_code(-2014, "API-key format invalid.".into()),
            ApiError::Auth(_)
        ));
        assert!(matches!(
            classify_code(-1003, "Too much request weight.".into()),
            ApiError::Api { code: -1003, .. }
        ));
    }

    #[test]
    fn test_query_string_preserves_order() {
        let params: Params = vec![
            ("symbol".into(), "BTCUSDT".into()),
            ("limit".into(), "1000".into()),
            ("startTime".into(), "1700000000000".into()),
        ];
        assert_eq!(
            BinanceSignedClient::query_string(&params),
            "symbol=BTCUSDT&limit=1000&startTime=1700000000000"
        );
    }
}
