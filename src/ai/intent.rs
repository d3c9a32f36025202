//! Keyword intent detection for chat messages (English and Vietnamese).

use regex::Regex;
use std::sync::LazyLock;

static STOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"còn hàng|hết hàng|còn không|còn ko|còn k\b|available|in stock|out of stock").expect("Invalid regex")
});
static POLICY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"chính sách|policy").expect("Invalid regex"));
static REFUND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"đổi trả|hoàn tiền|refund|return").expect("Invalid regex"));
static SHIPPING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"vận chuyển|ship|giao hàng|delivery").expect("Invalid regex"));
static WARRANTY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"bảo hành|warranty").expect("Invalid regex"));
static PAYMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"thanh toán|payment|pay").expect("Invalid regex"));

static REFUND_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)refund|return|doi-tra").expect("Invalid regex"));
static SHIPPING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ship|van-chuyen|giao-hang|delivery").expect("Invalid regex"));
static WARRANTY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)warranty|bao-hanh").expect("Invalid regex"));
static PAYMENT_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)payment|thanh-toan").expect("Invalid regex"));

/// Titles that look like policy documents.
pub static POLICY_TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)policy|chính\s*sách").expect("Invalid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyCategory { Refund, Shipping, Warranty, Payment }

impl PolicyCategory {
    /// Knowledge tags that belong to this category.
    pub fn tag_pattern(&self) -> &'static Regex {
        match self {
            Self::Refund => &REFUND_TAG,
            Self::Shipping => &SHIPPING_TAG,
            Self::Warranty => &WARRANTY_TAG,
            Self::Payment => &PAYMENT_TAG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Intent {
    pub stock_inquiry: bool,
    pub policy: bool,
    pub category: Option<PolicyCategory>,
}

/// First matching category wins: refund, shipping, warranty, payment.
pub fn classify(message: &str) -> Intent {
    let lower = message.to_lowercase();
    let category = [
        (PolicyCategory::Refund, &*REFUND_RE),
        (PolicyCategory::Shipping, &*SHIPPING_RE),
        (PolicyCategory::Warranty, &*WARRANTY_RE),
        (PolicyCategory::Payment, &*PAYMENT_RE),
    ]
    .into_iter()
    .find(|(_, re)| re.is_match(&lower))
    .map(|(c, _)| c);
    Intent { stock_inquiry: STOCK_RE.is_match(&lower), policy: POLICY_RE.is_match(&lower), category }
}
