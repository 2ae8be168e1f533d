//! Payment mode to account routing

use serde::{Deserialize, Serialize};

/// Mode recorded for transfers into one of the organization's bank accounts
pub const NEFT_MODE: &str = "NEFT";

/// Normalized payment mode/account pair
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentRouting {
    pub mode: Option<String>,
    pub account: Option<String>,
}

/// Route bank-account short codes into the account field.
///
/// When `mode` names one of the organization's account codes the mode
/// becomes `NEFT` and the account becomes the code as configured. Cash and
/// every other token pass through unchanged, as does the supplied account.
pub fn normalize_payment_mode<S: AsRef<str>>(
    mode: Option<&str>,
    account: Option<&str>,
    known_account_codes: &[S],
) -> PaymentRouting {
    let trimmed = mode.map(str::trim).filter(|m| !m.is_empty());
    let account = account
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);

    let Some(token) = trimmed else {
        return PaymentRouting { mode: None, account };
    };

    match known_account_codes
        .iter()
        .map(|code| code.as_ref().trim())
        .find(|code| code.eq_ignore_ascii_case(token))
    {
        Some(code) => PaymentRouting {
            mode: Some(NEFT_MODE.to_string()),
            account: Some(code.to_string()),
        },
        None => PaymentRouting {
            mode: Some(token.to_string()),
            account,
        },
    }
}
