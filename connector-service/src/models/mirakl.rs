use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Mirakl identifiers and custom field values arrive either as JSON strings or numbers
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_json::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Ok(Some(other.to_string())),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
    #[serde(rename = "shop_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "shop_name", default)]
    pub name: Option<String>,
    #[serde(rename = "contact_informations", alias = "contact_information", default)]
    pub contact_information: ContactInformation,
    #[serde(rename = "pro_details", alias = "professional_information", default)]
    pub professional_information: Option<ProfessionalInformation>,
    #[serde(rename = "payment_info", alias = "payment_information", default)]
    pub payment_information: Option<PaymentInformation>,
    #[serde(default)]
    pub currency_iso_code: Option<String>,
    #[serde(rename = "shop_additional_fields", alias = "additional_fields", default)]
    pub additional_fields: Vec<AdditionalField>,
}

impl Shop {
    /// Trimmed, non-empty value of a custom field
    pub fn additional_field(&self, code: &str) -> Option<&str> {
        self.additional_fields
            .iter()
            .find(|field| field.code == code)
            .and_then(|field| field.value.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactInformation {
    pub civility: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub street1: Option<String>,
    pub street2: Option<String>,
    pub zip_code: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// ISO-3166 alpha-3
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfessionalInformation {
    pub corporate_name: Option<String>,
    pub tax_identification_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum PaymentInformation {
    #[serde(rename = "IBAN")]
    Iban(IbanBankAccount),
    #[serde(rename = "ABA")]
    Aba(AbaBankAccount),
    #[serde(rename = "UK")]
    Uk(UkBankAccount),
    #[serde(other)]
    Unsupported,
}

impl PaymentInformation {
    pub fn owner(&self) -> Option<&str> {
        match self {
            PaymentInformation::Iban(account) => account.owner.as_deref(),
            PaymentInformation::Aba(account) => account.owner.as_deref(),
            PaymentInformation::Uk(account) => account.owner.as_deref(),
            PaymentInformation::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IbanBankAccount {
    pub owner: Option<String>,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub bank_city: Option<String>,
    pub bank_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AbaBankAccount {
    pub owner: Option<String>,
    pub bank_account_number: Option<String>,
    pub routing_number: Option<String>,
    pub bank_name: Option<String>,
    pub bank_city: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UkBankAccount {
    pub owner: Option<String>,
    pub bank_account_number: Option<String>,
    pub bank_sort_code: Option<String>,
    pub bank_name: Option<String>,
    pub bank_city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditionalField {
    pub code: String,
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Shops {
    #[serde(default)]
    pub shops: Vec<Shop>,
    #[serde(default)]
    pub total_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetShopsRequest {
    pub offset: i64,
    pub max: Option<u32>,
    pub updated_since: Option<DateTime<Utc>>,
    pub shop_ids: Vec<String>,
    pub paginate: bool,
}

impl Default for GetShopsRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            max: None,
            updated_since: None,
            shop_ids: Vec::new(),
            paginate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopDocument {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub shop_id: String,
    #[serde(rename = "type")]
    pub type_code: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub date_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShopDocuments {
    #[serde(rename = "shop_documents", alias = "documents", default)]
    pub documents: Vec<ShopDocument>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedDocument {
    pub filename: String,
    pub content: Bytes,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualCreditRequest {
    pub invoices: Vec<ManualAccountingDocument>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualAccountingDocument {
    pub shop_id: i64,
    #[serde(rename = "type")]
    pub document_type: String,
    pub currency_iso_code: String,
    pub description: String,
    pub lines: Vec<ManualAccountingDocumentLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualAccountingDocumentLine {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: rust_decimal::Decimal,
    pub description: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualAccountingDocumentReturn {
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub manual_accounting_document_id: Option<String>,
    #[serde(default)]
    pub manual_accounting_document_error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManualAccountingDocumentReturns {
    #[serde(default)]
    pub manual_accounting_documents_returns: Vec<ManualAccountingDocumentReturn>,
}
