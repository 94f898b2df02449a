use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegalEntity {
    Individual,
    Business,
}

impl LegalEntity {
    /// Case-insensitive match of the marketplace LIST value
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "INDIVIDUAL" => Some(LegalEntity::Individual),
            "BUSINESS" => Some(LegalEntity::Business),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Gender {
    pub fn from_civility(civility: &str) -> Self {
        match civility.trim().to_uppercase().as_str() {
            "MR" => Gender::Male,
            "MRS" | "MISS" | "MS" => Gender::Female,
            _ => Gender::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhoneType {
    Mobile,
    Landline,
    Sim,
    Fax,
}

impl PhoneType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "MOBILE" => Some(PhoneType::Mobile),
            "LANDLINE" => Some(PhoneType::Landline),
            "SIM" => Some(PhoneType::Sim),
            "FAX" => Some(PhoneType::Fax),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    BankStatement,
    CompanyRegistrationScreening,
    Passport,
    IdCardFront,
    IdCardBack,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::BankStatement => "BANK_STATEMENT",
            DocumentType::CompanyRegistrationScreening => "COMPANY_REGISTRATION_SCREENING",
            DocumentType::Passport => "PASSPORT",
            DocumentType::IdCardFront => "ID_CARD_FRONT",
            DocumentType::IdCardBack => "ID_CARD_BACK",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_number_or_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_or_province: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Name {
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BankAccountDetail {
    #[serde(rename = "bankAccountUUID", skip_serializing_if = "Option::is_none")]
    pub bank_account_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_bic_swift: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_house_number_or_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_account: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentData {
    #[serde(rename = "type")]
    pub document_type: String,
    pub number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub document_data: Vec<DocumentData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhoneNumber {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_type: Option<PhoneType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareholderContact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shareholder_code: Option<String>,
    #[serde(default)]
    pub name: Name,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_data: Option<PersonalData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<PhoneNumber>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_business_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doing_business_as: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shareholders: Vec<ShareholderContact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualDetails {
    pub name: Name,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_data: Option<PersonalData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountHolderDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bank_account_details: Vec<BankAccountDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_details: Option<BusinessDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub individual_details: Option<IndividualDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AccountHolderDetails {
    pub fn shareholders(&self) -> &[ShareholderContact] {
        self.business_details
            .as_ref()
            .map(|business| business.shareholders.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Account {
    pub account_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Looks an account holder up by its own code or by one of its account codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetAccountHolderRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_holder_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetAccountHolderResponse {
    pub account_holder_code: Option<String>,
    pub account_holder_details: AccountHolderDetails,
    pub legal_entity: Option<LegalEntity>,
    pub accounts: Vec<Account>,
    pub psp_reference: Option<String>,
}

impl GetAccountHolderResponse {
    /// An empty code means the account holder does not exist
    pub fn exists(&self) -> bool {
        self.account_holder_code
            .as_deref()
            .map(|code| !code.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn bank_account_uuids(&self) -> Vec<String> {
        self.account_holder_details
            .bank_account_details
            .iter()
            .filter_map(|detail| detail.bank_account_uuid.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountHolderRequest {
    pub account_holder_code: String,
    pub account_holder_details: AccountHolderDetails,
    pub legal_entity: LegalEntity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_tier: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountHolderRequest {
    pub account_holder_code: String,
    pub account_holder_details: AccountHolderDetails,
}

/// Response shape shared by account holder create and update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountHolderResponse {
    pub account_holder_code: Option<String>,
    pub account_code: Option<String>,
    pub account_holder_details: AccountHolderDetails,
    pub psp_reference: Option<String>,
    pub invalid_fields: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBankAccountRequest {
    pub account_holder_code: String,
    #[serde(rename = "bankAccountUUIDs")]
    pub bank_account_uuids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenericResponse {
    pub psp_reference: Option<String>,
    pub result_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetail {
    pub account_holder_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shareholder_code: Option<String>,
    #[serde(rename = "bankAccountUUID", default, skip_serializing_if = "Option::is_none")]
    pub bank_account_uuid: Option<String>,
    pub document_type: DocumentType,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDocumentRequest {
    /// Base64 encoded file body
    pub document_content: String,
    pub document_detail: DocumentDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub currency: String,
    /// Minor units
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutAccountHolderRequest {
    pub account_code: String,
    pub account_holder_code: String,
    pub amount: Amount,
    #[serde(rename = "bankAccountUUID")]
    pub bank_account_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PayoutAccountHolderResponse {
    pub psp_reference: Option<String>,
    #[serde(rename = "bankAccountUUID")]
    pub bank_account_uuid: Option<String>,
    pub merchant_reference: Option<String>,
}

/// Body returned by the MarketPay API on non-2xx responses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorResponse {
    pub status: u16,
    pub error_code: String,
    pub message: String,
    pub error_type: String,
}
