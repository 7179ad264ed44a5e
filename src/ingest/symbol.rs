/// 알려진 결제 통화 접미사 (긴 것 우선 매칭)
const KNOWN_QUOTES: [&str; 26] = [
    "USDT", "FDUSD", "BUSD", "USDC", "BTC", "ETH", "BNB", "EUR", "GBP", "TRY", "AUD", "BRL",
    "ARS", "MXN", "ZAR", "PLN", "RUB", "UAH", "IDR", "NGN", "SAR", "AED", "JPY", "CAD", "CHF",
    "INR",
];

/// 자산 ↔ 마켓 심볼 매핑
///
/// 현재는 base → base+USDT 매핑을 유지합니다. 결제 통화 자체는 마켓이 없으므로
/// 건너뜁니다. 잘못 조합된 심볼은 API의 유효하지 않은 심볼 오류로 걸러집니다.
#[derive(Debug, Clone)]
pub struct SymbolMapper {
    default_quote: String,
}

impl Default for SymbolMapper {
    fn default() -> Self {
        Self {
            default_quote: "USDT".to_string(),
        }
    }
}

impl SymbolMapper {
    pub fn new(default_quote: &str) -> Self {
        Self {
            default_quote: default_quote.to_string(),
        }
    }

    /// 자산을 마켓 심볼로 변환, 예: BTC → BTCUSDT
    pub fn to_market(&self, asset: &str) -> Option<String> {
        let asset = asset.trim();
        if asset.is_empty() || asset.eq_ignore_ascii_case(&self.default_quote) {
            return None;
        }
        Some(format!("{}{}", asset.to_uppercase(), self.default_quote))
    }
}

/// 심볼을 (base, quote)로 분리. 알려진 결제 통화 접미사 우선, 없으면 뒤 3글자.
pub fn split_symbol(symbol: &str) -> (String, String) {
    for quote in KNOWN_QUOTES {
        if symbol.len() > quote.len() && symbol.ends_with(quote) {
            let base = &symbol[..symbol.len() - quote.len()];
            return (base.to_string(), quote.to_string());
        }
    }
    // 최선 노력: 뒤 3글자를 결제 통화로 간주
    let split = symbol.len().saturating_sub(3);
    (symbol[..split].to_string(), symbol[split..].to_string())
}
