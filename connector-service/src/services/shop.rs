//! Shop -> account holder synchronisation

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clients::{AdyenApi, AdyenError, MiraklApi, MiraklError};
use crate::models::adyen::{
    AccountHolderDetails, Address, BankAccountDetail, BusinessDetails, CreateAccountHolderRequest,
    DeleteBankAccountRequest, Gender, GetAccountHolderResponse, IndividualDetails, LegalEntity, Name,
    UpdateAccountHolderRequest,
};
use crate::models::mirakl::{GetShopsRequest, ManualAccountingDocumentReturn, PaymentInformation, Shop};
use crate::models::notification::CompensateNegativeBalanceRecord;
use crate::services::address::{iso2_from_iso3, HouseNumberParser};
use crate::services::delta::DeltaService;
use crate::services::document::{DocumentError, DocumentService};
use crate::services::shareholder_mapping::ShareholderMappingService;
use crate::services::ubo::UboService;

pub const LEGAL_ENTITY_FIELD: &str = "adyen-legal-entity-type";
pub const INDIVIDUAL_HOUSE_NUMBER_FIELD: &str = "adyen-individual-housenumber";
pub const BUSINESS_REGISTERED_NAME_FIELD: &str = "adyen-business-registeredname";

#[derive(Debug, thiserror::Error)]
pub enum ShopError {
    #[error("Mirakl error: {0}")]
    Mirakl(#[from] MiraklError),

    #[error("Adyen error: {0}")]
    Adyen(#[from] AdyenError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Missing or invalid legal entity type for shop {0}")]
    LegalEntity(String),

    #[error("No account holder found for account {0}")]
    AccountHolderNotFound(String),

    #[error("Invalid amount {value} {currency}")]
    InvalidAmount { value: i64, currency: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShopOutcome {
    Created,
    Updated,
    Skipped,
}

pub struct ShopService {
    mirakl: Arc<dyn MiraklApi>,
    adyen: Arc<dyn AdyenApi>,
    deltas: DeltaService,
    ubos: UboService,
    mappings: ShareholderMappingService,
    documents: Arc<DocumentService>,
    house_numbers: Arc<HouseNumberParser>,
    processing_tier: Option<i32>,
}

impl ShopService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mirakl: Arc<dyn MiraklApi>,
        adyen: Arc<dyn AdyenApi>,
        deltas: DeltaService,
        ubos: UboService,
        mappings: ShareholderMappingService,
        documents: Arc<DocumentService>,
        house_numbers: Arc<HouseNumberParser>,
        processing_tier: Option<i32>,
    ) -> Self {
        Self {
            mirakl,
            adyen,
            deltas,
            ubos,
            mappings,
            documents,
            house_numbers,
            processing_tier,
        }
    }

    /// Page through every shop updated since the last watermark
    pub async fn get_updated_shops(&self) -> Result<Vec<Shop>, ShopError> {
        let updated_since = self.deltas.get_shop_delta().await?;

        let mut shops = Vec::new();
        let mut offset = 0i64;
        let mut total = 1i64;

        while offset < total {
            let page = self
                .mirakl
                .get_shops(GetShopsRequest {
                    offset,
                    updated_since,
                    paginate: true,
                    ..Default::default()
                })
                .await?;

            if page.shops.is_empty() {
                break;
            }

            total = page.total_count;
            offset += page.shops.len() as i64;
            shops.extend(page.shops);
        }

        Ok(shops)
    }

    pub async fn process_updated_shops(&self) -> Result<usize, ShopError> {
        let before = Utc::now();
        let shops = self.get_updated_shops().await?;
        info!(count = shops.len(), "Retrieved updated shops");

        let mut processed = 0;
        for shop in &shops {
            match self.process_shop(shop).await {
                Ok(outcome) => {
                    debug!(shop_id = %shop.id, ?outcome, "Shop processed");
                    processed += 1;
                }
                Err(e) => error!(shop_id = %shop.id, error = %e, "Failed to process shop"),
            }
        }

        self.deltas.update_shop_delta(before).await?;
        Ok(processed)
    }

    pub async fn process_shop(&self, shop: &Shop) -> Result<ShopOutcome, ShopError> {
        let existing = match self.adyen.get_account_holder(&shop.id).await {
            Ok(holder) if holder.exists() => Some(holder),
            Ok(_) => None,
            Err(e) => {
                debug!(shop_id = %shop.id, error = %e, "Account holder lookup failed, treating as new");
                None
            }
        };

        match existing {
            Some(holder) => self.update_account_holder(shop, &holder).await,
            None => self.create_account_holder(shop).await,
        }
    }

    async fn create_account_holder(&self, shop: &Shop) -> Result<ShopOutcome, ShopError> {
        let request = self.create_account_holder_request(shop).await?;

        if request.legal_entity == LegalEntity::Business
            && request.account_holder_details.shareholders().is_empty()
        {
            warn!(shop_id = %shop.id, "Business shop has no UBOs, skipping account holder creation");
            return Ok(ShopOutcome::Skipped);
        }

        let response = self.adyen.create_account_holder(request).await?;
        info!(shop_id = %shop.id, psp_reference = ?response.psp_reference, "Account holder created");

        self.mappings
            .update_shareholder_mapping(shop, response.account_holder_details.shareholders())
            .await?;

        Ok(ShopOutcome::Created)
    }

    async fn update_account_holder(
        &self,
        shop: &Shop,
        existing: &GetAccountHolderResponse,
    ) -> Result<ShopOutcome, ShopError> {
        let bank_account_changed = self.is_bank_account_changed(existing, shop);
        let request = self.update_account_holder_request(shop, existing).await?;

        let response = self.adyen.update_account_holder(request).await?;
        info!(shop_id = %shop.id, psp_reference = ?response.psp_reference, "Account holder updated");

        self.mappings
            .update_shareholder_mapping(shop, response.account_holder_details.shareholders())
            .await?;

        if bank_account_changed {
            let request = self.delete_bank_accounts_request(existing);
            info!(shop_id = %shop.id, count = request.bank_account_uuids.len(), "Removing replaced bank accounts");
            self.adyen.delete_bank_accounts(request).await?;
        }

        self.documents.retry_documents_for_shop(&shop.id).await?;

        Ok(ShopOutcome::Updated)
    }

    fn legal_entity(&self, shop: &Shop) -> Result<LegalEntity, ShopError> {
        shop.additional_field(LEGAL_ENTITY_FIELD)
            .and_then(LegalEntity::parse)
            .ok_or_else(|| ShopError::LegalEntity(shop.id.clone()))
    }

    fn country_iso2(shop: &Shop) -> Option<&'static str> {
        shop.contact_information.country.as_deref().and_then(iso2_from_iso3)
    }

    /// Street without the house number, and the house number
    fn street_and_house_number(&self, shop: &Shop) -> (Option<String>, Option<String>) {
        let street1 = shop.contact_information.street1.as_deref();

        match (street1, shop.additional_field(INDIVIDUAL_HOUSE_NUMBER_FIELD)) {
            (street, Some(number)) => (street.map(str::to_string), Some(number.to_string())),
            (Some(street), None) => {
                let (street, number) = self
                    .house_numbers
                    .split(Self::country_iso2(shop).unwrap_or_default(), street);
                (Some(street), number)
            }
            (None, None) => (None, None),
        }
    }

    fn address(&self, shop: &Shop) -> Address {
        let contact = &shop.contact_information;
        let (street, house_number) = self.street_and_house_number(shop);

        Address {
            city: contact.city.clone(),
            country: Self::country_iso2(shop).map(str::to_string),
            house_number_or_name: house_number,
            postal_code: contact.zip_code.clone(),
            state_or_province: contact.state.clone(),
            street,
        }
    }

    pub fn create_bank_account_detail(&self, shop: &Shop) -> Option<BankAccountDetail> {
        let contact = &shop.contact_information;
        let (street, house_number) = self.street_and_house_number(shop);

        let mut detail = match shop.payment_information.as_ref()? {
            PaymentInformation::Iban(account) => {
                let iban = account.iban.clone()?;
                BankAccountDetail {
                    country_code: Some(iban.chars().take(2).collect()),
                    iban: Some(iban),
                    bank_bic_swift: account.bic.clone(),
                    bank_city: account.bank_city.clone(),
                    bank_name: account.bank_name.clone(),
                    ..Default::default()
                }
            }
            PaymentInformation::Aba(account) => BankAccountDetail {
                account_number: account.bank_account_number.clone(),
                branch_code: account.routing_number.clone(),
                bank_name: account.bank_name.clone(),
                bank_city: account.bank_city.clone(),
                country_code: Some("US".to_string()),
                ..Default::default()
            },
            PaymentInformation::Uk(account) => BankAccountDetail {
                account_number: account.bank_account_number.clone(),
                branch_code: account.bank_sort_code.clone(),
                bank_name: account.bank_name.clone(),
                bank_city: account.bank_city.clone(),
                country_code: Some("GB".to_string()),
                ..Default::default()
            },
            PaymentInformation::Unsupported => return None,
        };

        detail.currency_code = shop.currency_iso_code.clone();
        detail.owner_name = shop.payment_information.as_ref().and_then(|p| p.owner()).map(str::to_string);
        detail.owner_postal_code = contact.zip_code.clone();
        detail.owner_city = contact.city.clone();
        detail.owner_state = contact.state.clone();
        detail.owner_street = street;
        detail.owner_house_number_or_name = house_number;
        detail.owner_country_code = Self::country_iso2(shop).map(str::to_string);
        detail.primary_account = Some(true);

        Some(detail)
    }

    async fn account_holder_details(
        &self,
        shop: &Shop,
        legal_entity: LegalEntity,
        existing: Option<&GetAccountHolderResponse>,
        include_bank_account: bool,
    ) -> Result<AccountHolderDetails, ShopError> {
        let contact = &shop.contact_information;

        let bank_account_details = if include_bank_account {
            self.create_bank_account_detail(shop).into_iter().collect()
        } else {
            Vec::new()
        };

        let mut details = AccountHolderDetails {
            address: Some(self.address(shop)),
            bank_account_details,
            email: contact.email.clone(),
            ..Default::default()
        };

        match legal_entity {
            LegalEntity::Individual => {
                details.individual_details = Some(IndividualDetails {
                    name: Name {
                        first_name: contact.firstname.clone().unwrap_or_default(),
                        last_name: contact.lastname.clone().unwrap_or_default(),
                        gender: contact
                            .civility
                            .as_deref()
                            .map(Gender::from_civility)
                            .unwrap_or(Gender::Unknown),
                    },
                    personal_data: None,
                });
            }
            LegalEntity::Business => {
                let professional = shop.professional_information.clone().unwrap_or_default();
                details.business_details = Some(BusinessDetails {
                    legal_business_name: professional.corporate_name,
                    tax_id: professional.tax_identification_number,
                    doing_business_as: shop
                        .additional_field(BUSINESS_REGISTERED_NAME_FIELD)
                        .map(str::to_string),
                    shareholders: self.ubos.extract_ubos(shop, existing).await?,
                });
            }
        }

        Ok(details)
    }

    pub async fn create_account_holder_request(&self, shop: &Shop) -> Result<CreateAccountHolderRequest, ShopError> {
        let legal_entity = self.legal_entity(shop)?;

        Ok(CreateAccountHolderRequest {
            account_holder_code: shop.id.clone(),
            account_holder_details: self.account_holder_details(shop, legal_entity, None, true).await?,
            legal_entity,
            processing_tier: self.processing_tier,
        })
    }

    /// Bank details are only sent when they differ from the holder's first bank account
    pub async fn update_account_holder_request(
        &self,
        shop: &Shop,
        existing: &GetAccountHolderResponse,
    ) -> Result<UpdateAccountHolderRequest, ShopError> {
        let legal_entity = match self.legal_entity(shop) {
            Ok(entity) => entity,
            Err(e) => existing.legal_entity.ok_or(e)?,
        };

        let include_bank_account = existing.account_holder_details.bank_account_details.is_empty()
            || self.is_bank_account_changed(existing, shop);

        Ok(UpdateAccountHolderRequest {
            account_holder_code: shop.id.clone(),
            account_holder_details: self
                .account_holder_details(shop, legal_entity, Some(existing), include_bank_account)
                .await?,
        })
    }

    /// True when the holder already has a bank account and the shop now carries a different one
    pub fn is_bank_account_changed(&self, existing: &GetAccountHolderResponse, shop: &Shop) -> bool {
        let Some(current) = existing.account_holder_details.bank_account_details.first() else {
            return false;
        };
        let Some(new) = self.create_bank_account_detail(shop) else {
            return false;
        };

        match shop.payment_information {
            Some(PaymentInformation::Iban(_)) => new.iban != current.iban,
            _ => new.account_number != current.account_number || new.branch_code != current.branch_code,
        }
    }

    pub fn delete_bank_accounts_request(&self, existing: &GetAccountHolderResponse) -> DeleteBankAccountRequest {
        DeleteBankAccountRequest {
            account_holder_code: existing.account_holder_code.clone().unwrap_or_default(),
            bank_account_uuids: existing.bank_account_uuids(),
        }
    }

    /// Credit the shop in the marketplace for a balance MarketPay compensated
    pub async fn process_compensate_negative_balance(
        &self,
        record: &CompensateNegativeBalanceRecord,
        psp_reference: Option<&str>,
    ) -> Result<ManualAccountingDocumentReturn, ShopError> {
        let holder = self
            .adyen
            .get_account_holder_by_account_code(&record.account_code)
            .await?;
        if !holder.exists() {
            return Err(ShopError::AccountHolderNotFound(record.account_code.clone()));
        }
        let shop_id = holder.account_holder_code.unwrap_or_default();

        let value = record.amount.value.checked_abs().ok_or_else(|| ShopError::InvalidAmount {
            value: record.amount.value,
            currency: record.amount.currency.clone(),
        })?;
        let amount = Decimal::new(value, minor_unit_exponent(&record.amount.currency));
        let description = match psp_reference {
            Some(reference) => format!("Compensate negative balance, pspReference: {}", reference),
            None => "Compensate negative balance".to_string(),
        };

        let result = self
            .mirakl
            .create_manual_credit(&shop_id, &record.amount.currency, amount, &description)
            .await?;

        info!(shop_id = %shop_id, amount = %amount, "Created manual credit for negative balance");
        Ok(result)
    }
}

/// ISO 4217 minor units; anything not listed uses cents
fn minor_unit_exponent(currency: &str) -> u32 {
    match currency {
        "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF" | "UGX" | "VND" | "VUV"
        | "XAF" | "XOF" | "XPF" => 0,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::adyen::MockAdyenApi;
    use crate::clients::mirakl::MockMiraklApi;
    use crate::config::default_house_number_patterns;
    use crate::models::adyen::{AccountHolderResponse, Amount, GenericResponse};
    use crate::models::mirakl::{ManualAccountingDocumentReturn, Shops};
    use crate::repository::{MockDeltaRepository, MockDocRetryRepository, MockShareholderMappingRepository};
    use crate::services::document::DocumentSettings;
    use crate::services::ubo::tests::ubo_fields;
    use pretty_assertions::assert_eq;

    struct Mocks {
        mirakl: MockMiraklApi,
        adyen: MockAdyenApi,
        deltas: MockDeltaRepository,
        mappings: MockShareholderMappingRepository,
        retries: MockDocRetryRepository,
    }

    impl Mocks {
        fn new() -> Self {
            let mut mappings = MockShareholderMappingRepository::new();
            mappings.expect_find_by_shop_and_ubo().returning(|_, _| Ok(None));
            mappings.expect_find_by_shareholder_code().returning(|_| Ok(None));
            Self {
                mirakl: MockMiraklApi::new(),
                adyen: MockAdyenApi::new(),
                deltas: MockDeltaRepository::new(),
                mappings,
                retries: MockDocRetryRepository::new(),
            }
        }

        fn build(self) -> ShopService {
            let mirakl: Arc<dyn MiraklApi> = Arc::new(self.mirakl);
            let adyen: Arc<dyn AdyenApi> = Arc::new(self.adyen);
            let deltas = DeltaService::new(Arc::new(self.deltas));
            let mapping_repository: Arc<MockShareholderMappingRepository> = Arc::new(self.mappings);
            let house_numbers = Arc::new(HouseNumberParser::new(&default_house_number_patterns()).unwrap());
            let mappings = ShareholderMappingService::new(4, mapping_repository.clone());
            let documents = Arc::new(DocumentService::new(
                mirakl.clone(),
                adyen.clone(),
                deltas.clone(),
                mappings.clone(),
                Arc::new(self.retries),
                DocumentSettings {
                    max_ubos: 4,
                    max_doc_retries: 5,
                    test_environment: true,
                },
            ));

            ShopService::new(
                mirakl,
                adyen,
                deltas,
                UboService::new(4, mapping_repository, house_numbers.clone()),
                mappings,
                documents,
                house_numbers,
                Some(1),
            )
        }
    }

    fn shop(id: &str, legal_entity: &str, extra: Vec<(String, String)>) -> Shop {
        let mut fields = vec![serde_json::json!({"code": LEGAL_ENTITY_FIELD, "type": "LIST", "value": legal_entity})];
        fields.extend(
            extra
                .iter()
                .map(|(code, value)| serde_json::json!({"code": code, "type": "STRING", "value": value})),
        );
        serde_json::from_value(serde_json::json!({
            "shop_id": id,
            "contact_informations": {
                "civility": "Mr", "firstname": "Jan", "lastname": "Jansen", "email": "jan@example.com",
                "street1": "Kosterpark 610b", "zip_code": "1234AB", "city": "Amsterdam", "country": "NLD"
            },
            "pro_details": {"corporate_name": "Jansen BV", "tax_identification_number": "NL001"},
            "payment_info": {"@type": "IBAN", "owner": "Jan Jansen", "iban": "NL91ABNA0417164300", "bic": "ABNANL2A"},
            "currency_iso_code": "EUR",
            "shop_additional_fields": fields
        }))
        .unwrap()
    }

    fn existing_holder(iban: &str) -> GetAccountHolderResponse {
        GetAccountHolderResponse {
            account_holder_code: Some("2012".to_string()),
            account_holder_details: AccountHolderDetails {
                bank_account_details: vec![BankAccountDetail {
                    bank_account_uuid: Some("old-uuid".to_string()),
                    iban: Some(iban.to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            },
            legal_entity: Some(LegalEntity::Individual),
            ..Default::default()
        }
    }

    fn shop_page(ids: &[&str], total: i64) -> Shops {
        Shops {
            shops: ids.iter().map(|id| shop(id, "Individual", vec![])).collect(),
            total_count: total,
        }
    }

    #[tokio::test]
    async fn test_get_updated_shops_paginates_by_returned_count() {
        let mut mocks = Mocks::new();
        mocks.deltas.expect_latest_shop_delta().returning(|| Ok(None));
        mocks
            .mirakl
            .expect_get_shops()
            .withf(|request| request.offset == 0 && request.paginate && request.updated_since.is_none())
            .times(1)
            .returning(|_| Ok(shop_page(&["1", "2"], 3)));
        mocks
            .mirakl
            .expect_get_shops()
            .withf(|request| request.offset == 2)
            .times(1)
            .returning(|_| Ok(shop_page(&["3"], 3)));

        let shops = mocks.build().get_updated_shops().await.unwrap();
        let ids: Vec<_> = shops.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_get_updated_shops_stops_on_empty_page() {
        let mut mocks = Mocks::new();
        mocks.deltas.expect_latest_shop_delta().returning(|| Ok(None));
        mocks
            .mirakl
            .expect_get_shops()
            .withf(|request| request.offset == 0)
            .returning(|_| Ok(shop_page(&["1"], 10)));
        mocks
            .mirakl
            .expect_get_shops()
            .withf(|request| request.offset == 1)
            .times(1)
            .returning(|_| Ok(shop_page(&[], 10)));

        assert_eq!(mocks.build().get_updated_shops().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_request_for_individual() {
        let service = Mocks::new().build();
        let request = service
            .create_account_holder_request(&shop("2012", "individual", vec![]))
            .await
            .unwrap();

        assert_eq!(request.account_holder_code, "2012");
        assert_eq!(request.legal_entity, LegalEntity::Individual);
        assert_eq!(request.processing_tier, Some(1));

        let details = &request.account_holder_details;
        let address = details.address.as_ref().unwrap();
        assert_eq!(address.street.as_deref(), Some("Kosterpark"));
        assert_eq!(address.house_number_or_name.as_deref(), Some("610b"));
        assert_eq!(address.country.as_deref(), Some("NL"));

        let bank = &details.bank_account_details[0];
        assert_eq!(bank.country_code.as_deref(), Some("NL"));
        assert_eq!(bank.currency_code.as_deref(), Some("EUR"));
        assert_eq!(bank.owner_name.as_deref(), Some("Jan Jansen"));
        assert_eq!(bank.owner_house_number_or_name.as_deref(), Some("610b"));
        assert_eq!(bank.primary_account, Some(true));

        let name = &details.individual_details.as_ref().unwrap().name;
        assert_eq!(name.gender, Gender::Male);
    }

    #[tokio::test]
    async fn test_house_number_field_overrides_parsing() {
        let service = Mocks::new().build();
        let shop = shop(
            "2012",
            "INDIVIDUAL",
            vec![(INDIVIDUAL_HOUSE_NUMBER_FIELD.to_string(), "12".to_string())],
        );
        let request = service.create_account_holder_request(&shop).await.unwrap();
        let address = request.account_holder_details.address.unwrap();
        assert_eq!(address.house_number_or_name.as_deref(), Some("12"));
        assert_eq!(address.street.as_deref(), Some("Kosterpark 610b"));
    }

    #[tokio::test]
    async fn test_invalid_legal_entity() {
        let service = Mocks::new().build();
        let err = service
            .create_account_holder_request(&shop("2012", "PARTNERSHIP", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::LegalEntity(id) if id == "2012"));
    }

    #[test]
    fn test_uk_bank_account_detail() {
        let service = Mocks::new().build();
        let mut shop = shop("2012", "INDIVIDUAL", vec![]);
        shop.payment_information = serde_json::from_value(serde_json::json!({
            "@type": "UK", "owner": "Jan", "bank_account_number": "12345678", "bank_sort_code": "112233"
        }))
        .unwrap();

        let detail = service.create_bank_account_detail(&shop).unwrap();
        assert_eq!(detail.account_number.as_deref(), Some("12345678"));
        assert_eq!(detail.branch_code.as_deref(), Some("112233"));
        assert_eq!(detail.country_code.as_deref(), Some("GB"));
        assert_eq!(detail.iban, None);
    }

    #[test]
    fn test_aba_bank_account_detail() {
        let service = Mocks::new().build();
        let mut shop = shop("2012", "INDIVIDUAL", vec![]);
        shop.currency_iso_code = Some("USD".to_string());
        shop.payment_information = serde_json::from_value(serde_json::json!({
            "@type": "ABA", "owner": "Jan", "bank_account_number": "000123456789", "routing_number": "021000021",
            "bank_name": "Chase", "bank_city": "New York"
        }))
        .unwrap();

        let detail = service.create_bank_account_detail(&shop).unwrap();
        assert_eq!(detail.account_number.as_deref(), Some("000123456789"));
        assert_eq!(detail.branch_code.as_deref(), Some("021000021"));
        assert_eq!(detail.country_code.as_deref(), Some("US"));
        assert_eq!(detail.currency_code.as_deref(), Some("USD"));
        assert_eq!(detail.owner_name.as_deref(), Some("Jan"));
        assert_eq!(detail.iban, None);
    }

    #[tokio::test]
    async fn test_business_without_ubos_is_skipped() {
        let mut mocks = Mocks::new();
        mocks
            .adyen
            .expect_get_account_holder()
            .returning(|_| Ok(GetAccountHolderResponse::default()));
        mocks.adyen.expect_create_account_holder().never();

        let outcome = mocks
            .build()
            .process_shop(&shop("2012", "BUSINESS", vec![]))
            .await
            .unwrap();
        assert_eq!(outcome, ShopOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_business_with_ubos_is_created_and_mapped() {
        let mut mocks = Mocks::new();
        mocks.adyen.expect_get_account_holder().returning(|_| {
            Err(AdyenError::Api {
                status: 422,
                error_code: "10_001".to_string(),
                message: "Account holder does not exist".to_string(),
                error_type: "validation".to_string(),
            })
        });
        mocks
            .adyen
            .expect_create_account_holder()
            .withf(|request| request.account_holder_details.shareholders().len() == 1)
            .times(1)
            .returning(|request| {
                let mut details = request.account_holder_details.clone();
                if let Some(business) = details.business_details.as_mut() {
                    business.shareholders[0].shareholder_code = Some("sh-new".to_string());
                }
                Ok(AccountHolderResponse {
                    account_holder_code: Some(request.account_holder_code),
                    account_holder_details: details,
                    ..Default::default()
                })
            });
        mocks
            .mappings
            .expect_save()
            .withf(|shop, ubo, code| shop == "2012" && *ubo == 1 && code == "sh-new")
            .times(1)
            .returning(|shop, ubo, code| {
                Ok(crate::models::ShareholderMapping {
                    id: 1,
                    mirakl_shop_id: shop.to_string(),
                    mirakl_ubo_number: ubo,
                    adyen_shareholder_code: code.to_string(),
                })
            });

        let shop = shop("2012", "BUSINESS", ubo_fields(1, "Anna", "A", "a@example.com"));
        let outcome = mocks.build().process_shop(&shop).await.unwrap();
        assert_eq!(outcome, ShopOutcome::Created);
    }

    #[tokio::test]
    async fn test_update_with_changed_iban_deletes_old_accounts() {
        let mut mocks = Mocks::new();
        mocks
            .adyen
            .expect_get_account_holder()
            .returning(|_| Ok(existing_holder("NL00OLD0000000000")));
        mocks
            .adyen
            .expect_update_account_holder()
            .withf(|request| request.account_holder_details.bank_account_details.len() == 1)
            .times(1)
            .returning(|_| Ok(AccountHolderResponse::default()));
        mocks
            .adyen
            .expect_delete_bank_accounts()
            .withf(|request| request.bank_account_uuids == vec!["old-uuid".to_string()])
            .times(1)
            .returning(|_| Ok(GenericResponse::default()));
        mocks.retries.expect_find_by_shop().returning(|_| Ok(vec![]));

        let outcome = mocks
            .build()
            .process_shop(&shop("2012", "INDIVIDUAL", vec![]))
            .await
            .unwrap();
        assert_eq!(outcome, ShopOutcome::Updated);
    }

    #[tokio::test]
    async fn test_update_with_same_iban_omits_bank_details() {
        let mut mocks = Mocks::new();
        mocks
            .adyen
            .expect_get_account_holder()
            .returning(|_| Ok(existing_holder("NL91ABNA0417164300")));
        mocks
            .adyen
            .expect_update_account_holder()
            .withf(|request| request.account_holder_details.bank_account_details.is_empty())
            .times(1)
            .returning(|_| Ok(AccountHolderResponse::default()));
        mocks.adyen.expect_delete_bank_accounts().never();
        mocks.retries.expect_find_by_shop().returning(|_| Ok(vec![]));

        mocks
            .build()
            .process_shop(&shop("2012", "INDIVIDUAL", vec![]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_process_updated_shops_continues_after_failure_and_saves_delta() {
        let mut mocks = Mocks::new();
        mocks.deltas.expect_latest_shop_delta().returning(|| Ok(None));
        mocks
            .mirakl
            .expect_get_shops()
            .returning(|_| {
                let mut page = shop_page(&["1", "2"], 2);
                page.shops[0] = shop("1", "UNKNOWN", vec![]);
                Ok(page)
            });
        mocks
            .adyen
            .expect_get_account_holder()
            .returning(|_| Ok(GetAccountHolderResponse::default()));
        mocks
            .adyen
            .expect_create_account_holder()
            .times(1)
            .returning(|_| Ok(AccountHolderResponse::default()));
        mocks.deltas.expect_save_shop_delta().times(1).returning(|_| Ok(()));

        assert_eq!(mocks.build().process_updated_shops().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_compensate_negative_balance_creates_manual_credit() {
        let mut mocks = Mocks::new();
        mocks
            .adyen
            .expect_get_account_holder_by_account_code()
            .withf(|code| code == "134846738")
            .returning(|_| {
                Ok(GetAccountHolderResponse {
                    account_holder_code: Some("2012".to_string()),
                    ..Default::default()
                })
            });
        mocks
            .mirakl
            .expect_create_manual_credit()
            .withf(|shop_id, currency, amount, _| {
                shop_id == "2012" && currency == "EUR" && *amount == Decimal::new(1500, 2)
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(ManualAccountingDocumentReturn {
                    manual_accounting_document_id: Some("99".to_string()),
                    manual_accounting_document_error: None,
                })
            });

        let record = CompensateNegativeBalanceRecord {
            account_code: "134846738".to_string(),
            amount: Amount {
                currency: "EUR".to_string(),
                value: -1500,
            },
            transfer_date: None,
        };

        let result = mocks
            .build()
            .process_compensate_negative_balance(&record, Some("123456789"))
            .await
            .unwrap();
        assert_eq!(result.manual_accounting_document_id.as_deref(), Some("99"));
    }

    fn negative_balance(currency: &str, value: i64) -> CompensateNegativeBalanceRecord {
        CompensateNegativeBalanceRecord {
            account_code: "134846738".to_string(),
            amount: Amount {
                currency: currency.to_string(),
                value,
            },
            transfer_date: None,
        }
    }

    fn holder_for_account(adyen: &mut MockAdyenApi) {
        adyen.expect_get_account_holder_by_account_code().returning(|_| {
            Ok(GetAccountHolderResponse {
                account_holder_code: Some("2012".to_string()),
                ..Default::default()
            })
        });
    }

    #[tokio::test]
    async fn test_compensate_negative_balance_rejects_unrepresentable_amount() {
        let mut mocks = Mocks::new();
        holder_for_account(&mut mocks.adyen);
        mocks.mirakl.expect_create_manual_credit().never();

        let err = mocks
            .build()
            .process_compensate_negative_balance(&negative_balance("EUR", i64::MIN), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidAmount { value: i64::MIN, .. }));
    }

    #[tokio::test]
    async fn test_compensate_negative_balance_uses_currency_minor_units() {
        let mut mocks = Mocks::new();
        holder_for_account(&mut mocks.adyen);
        mocks
            .mirakl
            .expect_create_manual_credit()
            .withf(|_, currency, amount, description| {
                currency == "JPY" && *amount == Decimal::new(1500, 0) && description == "Compensate negative balance"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(ManualAccountingDocumentReturn::default()));

        mocks
            .build()
            .process_compensate_negative_balance(&negative_balance("JPY", -1500), None)
            .await
            .unwrap();
    }

    #[test]
    fn test_minor_unit_exponent() {
        assert_eq!(minor_unit_exponent("EUR"), 2);
        assert_eq!(minor_unit_exponent("JPY"), 0);
        assert_eq!(minor_unit_exponent("KWD"), 3);
    }
}
