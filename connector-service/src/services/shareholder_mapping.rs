use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::adyen::ShareholderContact;
use crate::models::mirakl::Shop;
use crate::models::ShareholderMapping;
use crate::repository::ShareholderMappingRepository;
use crate::services::ubo::UboFields;

#[derive(Clone)]
pub struct ShareholderMappingService {
    max_ubos: u32,
    repository: Arc<dyn ShareholderMappingRepository>,
}

impl ShareholderMappingService {
    pub fn new(max_ubos: u32, repository: Arc<dyn ShareholderMappingRepository>) -> Self {
        Self { max_ubos, repository }
    }

    pub async fn find_by_shop_and_ubo(
        &self,
        shop_id: &str,
        ubo_number: i32,
    ) -> Result<Option<ShareholderMapping>, sqlx::Error> {
        self.repository.find_by_shop_and_ubo(shop_id, ubo_number).await
    }

    pub async fn find_by_shareholder_code(&self, code: &str) -> Result<Option<ShareholderMapping>, sqlx::Error> {
        self.repository.find_by_shareholder_code(code).await
    }

    pub async fn save(&self, shop_id: &str, ubo_number: i32, code: &str) -> Result<ShareholderMapping, sqlx::Error> {
        self.repository.save(shop_id, ubo_number, code).await
    }

    /// Persist codes that MarketPay assigned to shareholders created for unmapped UBO slots.
    /// A response shareholder matches a slot on first name, last name and email.
    pub async fn update_shareholder_mapping(
        &self,
        shop: &Shop,
        shareholders: &[ShareholderContact],
    ) -> Result<usize, sqlx::Error> {
        let mut claimed: HashSet<String> = HashSet::new();
        let mut saved = 0;

        for ubo_number in 1..=self.max_ubos {
            let fields = UboFields::read(shop, ubo_number);
            let Some(identity) = fields.identity() else {
                continue;
            };

            if self
                .repository
                .find_by_shop_and_ubo(&shop.id, ubo_number as i32)
                .await?
                .is_some()
            {
                continue;
            }

            let mut matched = None;
            for shareholder in shareholders {
                let Some(code) = shareholder.shareholder_code.as_deref() else {
                    continue;
                };
                if claimed.contains(code)
                    || shareholder.name.first_name.trim() != identity.firstname.trim()
                    || shareholder.name.last_name.trim() != identity.lastname.trim()
                    || !shareholder.email.trim().eq_ignore_ascii_case(identity.email.trim())
                {
                    continue;
                }
                if self.repository.find_by_shareholder_code(code).await?.is_none() {
                    matched = Some(code.to_string());
                    break;
                }
            }

            match matched {
                Some(code) => {
                    self.repository.save(&shop.id, ubo_number as i32, &code).await?;
                    info!(shop_id = %shop.id, ubo_number, shareholder_code = %code, "Stored shareholder mapping");
                    claimed.insert(code);
                    saved += 1;
                }
                None => warn!(shop_id = %shop.id, ubo_number, "No shareholder returned for UBO"),
            }
        }

        Ok(saved)
    }
}
