//! Maps the `adyen-ubo{n}-*` custom shop fields onto MarketPay shareholders

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use crate::models::adyen::{
    Address, DocumentData, Gender, GetAccountHolderResponse, Name, PersonalData, PhoneNumber, PhoneType,
    ShareholderContact,
};
use crate::models::mirakl::Shop;
use crate::repository::ShareholderMappingRepository;
use crate::services::address::{iso2_from_iso3, HouseNumberParser};

pub fn ubo_field(ubo_number: u32, suffix: &str) -> String {
    format!("adyen-ubo{}-{}", ubo_number, suffix)
}

/// Raw custom field values for one UBO slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UboFields<'a> {
    pub civility: Option<&'a str>,
    pub firstname: Option<&'a str>,
    pub lastname: Option<&'a str>,
    pub email: Option<&'a str>,
    pub dob: Option<&'a str>,
    pub nationality: Option<&'a str>,
    pub idnumber: Option<&'a str>,
    pub housenumber: Option<&'a str>,
    pub streetname: Option<&'a str>,
    pub city: Option<&'a str>,
    pub zip: Option<&'a str>,
    pub country: Option<&'a str>,
    pub phonecountry: Option<&'a str>,
    pub phonetype: Option<&'a str>,
    pub phonenumber: Option<&'a str>,
}

/// Required identity of a UBO: first name, last name, email
pub struct UboIdentity<'a> {
    pub civility: &'a str,
    pub firstname: &'a str,
    pub lastname: &'a str,
    pub email: &'a str,
}

impl<'a> UboFields<'a> {
    pub fn read(shop: &'a Shop, ubo_number: u32) -> Self {
        let field = |suffix: &str| shop.additional_field(&ubo_field(ubo_number, suffix));
        Self {
            civility: field("civility"),
            firstname: field("firstname"),
            lastname: field("lastname"),
            email: field("email"),
            dob: field("dob"),
            nationality: field("nationality"),
            idnumber: field("idnumber"),
            housenumber: field("housenumber"),
            streetname: field("streetname"),
            city: field("city"),
            zip: field("zip"),
            country: field("country"),
            phonecountry: field("phonecountry"),
            phonetype: field("phonetype"),
            phonenumber: field("phonenumber"),
        }
    }

    pub fn identity(&self) -> Option<UboIdentity<'a>> {
        Some(UboIdentity {
            civility: self.civility?,
            firstname: self.firstname?,
            lastname: self.lastname?,
            email: self.email?,
        })
    }

    fn personal_data(&self) -> Option<PersonalData> {
        if self.dob.is_none() && self.nationality.is_none() && self.idnumber.is_none() {
            return None;
        }

        Some(PersonalData {
            date_of_birth: self.dob.map(|dob| dob.split('T').next().unwrap_or(dob).to_string()),
            nationality: self.nationality.map(str::to_string),
            document_data: self
                .idnumber
                .map(|number| {
                    vec![DocumentData {
                        document_type: "ID".to_string(),
                        number: number.to_string(),
                    }]
                })
                .unwrap_or_default(),
        })
    }

    fn address(&self, contact_country_iso3: Option<&str>, parser: &HouseNumberParser) -> Option<Address> {
        if self.housenumber.is_none()
            && self.streetname.is_none()
            && self.city.is_none()
            && self.zip.is_none()
            && self.country.is_none()
        {
            return None;
        }

        let (street, house_number) = match (self.streetname, self.housenumber) {
            (street, Some(number)) => (street.map(str::to_string), Some(number.to_string())),
            (Some(street), None) => {
                let country = contact_country_iso3.and_then(iso2_from_iso3).unwrap_or_default();
                let (street, number) = parser.split(country, street);
                (Some(street), number)
            }
            (None, None) => (None, None),
        };

        Some(Address {
            city: self.city.map(str::to_string),
            country: self.country.map(str::to_string),
            house_number_or_name: house_number,
            postal_code: self.zip.map(str::to_string),
            state_or_province: None,
            street,
        })
    }

    fn phone_number(&self) -> Option<PhoneNumber> {
        if self.phonecountry.is_none() && self.phonetype.is_none() && self.phonenumber.is_none() {
            return None;
        }

        Some(PhoneNumber {
            phone_country_code: self.phonecountry.map(str::to_string),
            phone_number: self.phonenumber.map(str::to_string),
            phone_type: self.phonetype.and_then(PhoneType::parse),
        })
    }
}

#[derive(Clone)]
pub struct UboService {
    max_ubos: u32,
    mappings: Arc<dyn ShareholderMappingRepository>,
    house_numbers: Arc<HouseNumberParser>,
}

impl UboService {
    pub fn new(
        max_ubos: u32,
        mappings: Arc<dyn ShareholderMappingRepository>,
        house_numbers: Arc<HouseNumberParser>,
    ) -> Self {
        Self {
            max_ubos,
            mappings,
            house_numbers,
        }
    }

    pub fn max_ubos(&self) -> u32 {
        self.max_ubos
    }

    /// Existing shareholder codes that no UBO slot has claimed yet, in holder order
    async fn unmapped_shareholder_codes(
        &self,
        existing: &GetAccountHolderResponse,
    ) -> Result<VecDeque<String>, sqlx::Error> {
        let mut codes = VecDeque::new();
        for shareholder in existing.account_holder_details.shareholders() {
            let Some(code) = shareholder.shareholder_code.as_deref() else {
                continue;
            };
            if self.mappings.find_by_shareholder_code(code).await?.is_none() {
                codes.push_back(code.to_string());
            }
        }
        Ok(codes)
    }

    pub async fn extract_ubos(
        &self,
        shop: &Shop,
        existing: Option<&GetAccountHolderResponse>,
    ) -> Result<Vec<ShareholderContact>, sqlx::Error> {
        let mut free_codes = match existing {
            Some(holder) => self.unmapped_shareholder_codes(holder).await?,
            None => VecDeque::new(),
        };

        let mut shareholders = Vec::new();
        for ubo_number in 1..=self.max_ubos {
            let fields = UboFields::read(shop, ubo_number);
            let Some(identity) = fields.identity() else {
                debug!(shop_id = %shop.id, ubo_number, "Skipping UBO without required fields");
                continue;
            };

            let shareholder_code = match self
                .mappings
                .find_by_shop_and_ubo(&shop.id, ubo_number as i32)
                .await?
            {
                Some(mapping) => Some(mapping.adyen_shareholder_code),
                None => free_codes.pop_front(),
            };

            shareholders.push(ShareholderContact {
                shareholder_code,
                name: Name {
                    first_name: identity.firstname.to_string(),
                    last_name: identity.lastname.to_string(),
                    gender: Gender::from_civility(identity.civility),
                },
                email: identity.email.to_string(),
                address: fields.address(shop.contact_information.country.as_deref(), &self.house_numbers),
                personal_data: fields.personal_data(),
                phone_number: fields.phone_number(),
            });
        }

        Ok(shareholders)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::default_house_number_patterns;
    use crate::models::adyen::{AccountHolderDetails, BusinessDetails};
    use crate::models::mirakl::AdditionalField;
    use crate::models::ShareholderMapping;
    use crate::repository::MockShareholderMappingRepository;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    pub fn shop_with_fields(id: &str, fields: &[(&str, &str)]) -> Shop {
        let json = serde_json::json!({
            "shop_id": id,
            "contact_informations": {"country": "NLD", "email": "shop@example.com"},
            "shop_additional_fields": fields
                .iter()
                .map(|(code, value)| serde_json::json!({"code": code, "type": "STRING", "value": value}))
                .collect::<Vec<_>>()
        });
        serde_json::from_value(json).unwrap()
    }

    pub fn ubo_fields(n: u32, first: &str, last: &str, email: &str) -> Vec<(String, String)> {
        vec![
            (ubo_field(n, "civility"), "Mrs".to_string()),
            (ubo_field(n, "firstname"), first.to_string()),
            (ubo_field(n, "lastname"), last.to_string()),
            (ubo_field(n, "email"), email.to_string()),
        ]
    }

    fn as_refs(fields: &[(String, String)]) -> Vec<(&str, &str)> {
        fields.iter().map(|(c, v)| (c.as_str(), v.as_str())).collect()
    }

    fn service(mappings: MockShareholderMappingRepository) -> UboService {
        UboService::new(
            4,
            Arc::new(mappings),
            Arc::new(HouseNumberParser::new(&default_house_number_patterns()).unwrap()),
        )
    }

    fn holder_with_codes(codes: &[&str]) -> GetAccountHolderResponse {
        GetAccountHolderResponse {
            account_holder_code: Some("2012".to_string()),
            account_holder_details: AccountHolderDetails {
                business_details: Some(BusinessDetails {
                    shareholders: codes
                        .iter()
                        .map(|code| ShareholderContact {
                            shareholder_code: Some(code.to_string()),
                            name: Name::default(),
                            email: String::new(),
                            address: None,
                            personal_data: None,
                            phone_number: None,
                        })
                        .collect(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_extract_full_ubo() {
        let mut fields = ubo_fields(1, "Anna", "de Vries", "anna@example.com");
        fields.extend(
            [
                ("dob", "1986-08-30T22:00:00Z"),
                ("nationality", "NL"),
                ("idnumber", "X123"),
                ("streetname", "Kosterpark 610b"),
                ("city", "Amsterdam"),
                ("zip", "1000AA"),
                ("country", "NL"),
                ("phonetype", "mobile"),
                ("phonenumber", "612345678"),
            ]
            .iter()
            .map(|(s, v)| (ubo_field(1, s), v.to_string())),
        );
        let shop = shop_with_fields("2012", &as_refs(&fields));

        let mut mappings = MockShareholderMappingRepository::new();
        mappings.expect_find_by_shop_and_ubo().returning(|_, _| Ok(None));

        let ubos = service(mappings).extract_ubos(&shop, None).await.unwrap();

        assert_eq!(ubos.len(), 1);
        let ubo = &ubos[0];
        assert_eq!(ubo.shareholder_code, None);
        assert_eq!(ubo.name.gender, Gender::Female);
        let personal = ubo.personal_data.as_ref().unwrap();
        assert_eq!(personal.date_of_birth.as_deref(), Some("1986-08-30"));
        assert_eq!(personal.document_data[0].document_type, "ID");
        let address = ubo.address.as_ref().unwrap();
        assert_eq!(address.street.as_deref(), Some("Kosterpark"));
        assert_eq!(address.house_number_or_name.as_deref(), Some("610b"));
        assert_eq!(
            ubo.phone_number.as_ref().unwrap().phone_type,
            Some(PhoneType::Mobile)
        );
    }

    #[tokio::test]
    async fn test_incomplete_ubo_is_skipped_and_optional_parts_absent() {
        let mut fields = ubo_fields(1, "Anna", "de Vries", "anna@example.com");
        fields.push((ubo_field(2, "firstname"), "Bob".to_string()));
        let shop = shop_with_fields("2012", &as_refs(&fields));

        let mut mappings = MockShareholderMappingRepository::new();
        mappings.expect_find_by_shop_and_ubo().returning(|_, _| Ok(None));

        let ubos = service(mappings).extract_ubos(&shop, None).await.unwrap();

        assert_eq!(ubos.len(), 1);
        assert!(ubos[0].address.is_none());
        assert!(ubos[0].personal_data.is_none());
        assert!(ubos[0].phone_number.is_none());
    }

    #[tokio::test]
    async fn test_shareholder_codes_from_mapping_then_unclaimed_existing() {
        let mut fields = ubo_fields(1, "Anna", "A", "a@example.com");
        fields.extend(ubo_fields(2, "Bea", "B", "b@example.com"));
        let shop = shop_with_fields("2012", &as_refs(&fields));

        let mut mappings = MockShareholderMappingRepository::new();
        mappings
            .expect_find_by_shop_and_ubo()
            .with(eq("2012"), eq(1))
            .returning(|_, _| {
                Ok(Some(ShareholderMapping {
                    id: 1,
                    mirakl_shop_id: "2012".to_string(),
                    mirakl_ubo_number: 1,
                    adyen_shareholder_code: "sh-1".to_string(),
                }))
            });
        mappings
            .expect_find_by_shop_and_ubo()
            .with(eq("2012"), eq(2))
            .returning(|_, _| Ok(None));
        mappings
            .expect_find_by_shareholder_code()
            .with(eq("sh-1"))
            .returning(|_| {
                Ok(Some(ShareholderMapping {
                    id: 1,
                    mirakl_shop_id: "2012".to_string(),
                    mirakl_ubo_number: 1,
                    adyen_shareholder_code: "sh-1".to_string(),
                }))
            });
        mappings
            .expect_find_by_shareholder_code()
            .with(eq("sh-2"))
            .returning(|_| Ok(None));

        let holder = holder_with_codes(&["sh-1", "sh-2"]);
        let ubos = service(mappings).extract_ubos(&shop, Some(&holder)).await.unwrap();

        assert_eq!(ubos[0].shareholder_code.as_deref(), Some("sh-1"));
        assert_eq!(ubos[1].shareholder_code.as_deref(), Some("sh-2"));
    }
}
