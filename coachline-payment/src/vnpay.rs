use chrono::{DateTime, Duration, Utc};
use coachline_shared::{Booking, PaymentInfo};
use coachline_store::app_config::VnpayConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::signing::{self, SECURE_HASH};
use crate::GatewayError;

/// Reply codes the gateway expects from the IPN endpoint.
pub mod codes {
    pub const SUCCESS: &str = "00";
    pub const ORDER_NOT_FOUND: &str = "01";
    pub const ALREADY_CONFIRMED: &str = "02";
    pub const INVALID_AMOUNT: &str = "04";
    pub const CHECKSUM_FAILED: &str = "97";
    pub const RETRY: &str = "99";
}

/// Amounts travel in minor units.
pub const AMOUNT_MULTIPLIER: i64 = 100;

const REFUND_FULL: &str = "02";

/// Gateway timestamps are local Vietnam time (GMT+7).
pub fn gateway_time(at: DateTime<Utc>) -> String {
    (at + Duration::hours(7)).format("%Y%m%d%H%M%S").to_string()
}

/// Builds the signed browser redirect for `booking`.
pub fn payment_url(
    config: &VnpayConfig,
    booking: &Booking,
    client_ip: &str,
    bank_code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String, GatewayError> {
    let mut params = BTreeMap::new();
    let mut put = |key: &str, value: String| {
        params.insert(key.to_string(), value);
    };
    put("vnp_Version", config.version.clone());
    put("vnp_Command", "pay".to_string());
    put("vnp_TmnCode", config.tmn_code.clone());
    put("vnp_Locale", config.locale.clone());
    put("vnp_CurrCode", config.currency.clone());
    put("vnp_TxnRef", booking.id.to_string());
    put("vnp_OrderInfo", format!("Thanh toan ve xe {}", booking.id));
    put("vnp_OrderType", config.order_type.clone());
    put("vnp_Amount", (booking.total_price * AMOUNT_MULTIPLIER).to_string());
    put("vnp_ReturnUrl", config.return_url.clone());
    put("vnp_IpAddr", client_ip.to_string());
    put("vnp_CreateDate", gateway_time(now));
    if let Some(expires_at) = booking.expires_at {
        put("vnp_ExpireDate", gateway_time(expires_at));
    }
    if let Some(code) = bank_code.filter(|c| !c.is_empty()) {
        put("vnp_BankCode", code.to_string());
    }

    let (query, signature) = signing::sign(config.hash_secret.expose(), &params)?;
    Ok(format!("{}?{}&{}={}", config.pay_url, query, SECURE_HASH, signature))
}

/// Body of the merchant refund API call.
#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    #[serde(rename = "vnp_RequestId")]
    pub request_id: String,
    #[serde(rename = "vnp_Version")]
    pub version: String,
    #[serde(rename = "vnp_Command")]
    pub command: String,
    #[serde(rename = "vnp_TmnCode")]
    pub tmn_code: String,
    #[serde(rename = "vnp_TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "vnp_TxnRef")]
    pub txn_ref: String,
    #[serde(rename = "vnp_Amount")]
    pub amount: String,
    #[serde(rename = "vnp_TransactionNo")]
    pub transaction_no: String,
    #[serde(rename = "vnp_TransactionDate")]
    pub transaction_date: String,
    #[serde(rename = "vnp_CreateBy")]
    pub create_by: String,
    #[serde(rename = "vnp_CreateDate")]
    pub create_date: String,
    #[serde(rename = "vnp_IpAddr")]
    pub ip_addr: String,
    #[serde(rename = "vnp_OrderInfo")]
    pub order_info: String,
    #[serde(rename = "vnp_SecureHash")]
    pub secure_hash: String,
}

impl RefundRequest {
    /// Full refund of the settled payment recorded on `booking`.
    pub fn full(
        config: &VnpayConfig,
        booking: &Booking,
        payment: &PaymentInfo,
        transaction_no: &str,
        requested_by: &str,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, GatewayError> {
        let mut request = RefundRequest {
            request_id: uuid::Uuid::new_v4().simple().to_string(),
            version: config.version.clone(),
            command: "refund".to_string(),
            tmn_code: config.tmn_code.clone(),
            transaction_type: REFUND_FULL.to_string(),
            txn_ref: booking.id.to_string(),
            amount: (payment.amount * AMOUNT_MULTIPLIER).to_string(),
            transaction_no: transaction_no.to_string(),
            transaction_date: gateway_time(payment.transaction_date),
            create_by: requested_by.to_string(),
            create_date: gateway_time(now),
            ip_addr: client_ip.to_string(),
            order_info: format!("Hoan tien ve xe {}", booking.id),
            secure_hash: String::new(),
        };
        request.secure_hash = signing::hmac_sha512_hex(config.hash_secret.expose(), &request.signed_data())?;
        Ok(request)
    }

    /// Pipe-joined fields in the order the refund API hashes them.
    pub fn signed_data(&self) -> String {
        let fields: [&str; 13] = [
            &self.request_id,
            &self.version,
            &self.command,
            &self.tmn_code,
            &self.transaction_type,
            &self.txn_ref,
            &self.amount,
            &self.transaction_no,
            &self.transaction_date,
            &self.create_by,
            &self.create_date,
            &self.ip_addr,
            &self.order_info,
        ];
        fields.join("|")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundResponse {
    #[serde(rename = "vnp_ResponseCode")]
    pub response_code: String,
    #[serde(rename = "vnp_Message")]
    #[serde(default)]
    pub message: String,
}

impl RefundResponse {
    pub fn is_success(&self) -> bool {
        self.response_code == codes::SUCCESS
    }
}
