//! Marketplace document -> MarketPay upload, with a retry queue for failures

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::{AdyenApi, AdyenError, MiraklApi, MiraklError};
use crate::models::adyen::{DocumentDetail, DocumentType, UploadDocumentRequest};
use crate::models::mirakl::ShopDocument;
use crate::repository::DocRetryRepository;
use crate::services::delta::DeltaService;
use crate::services::shareholder_mapping::ShareholderMappingService;

pub const BANK_PROOF: &str = "adyen-bankproof";
pub const COMPANY_REGISTRATION: &str = "adyen-company-registration";
pub const INDIVIDUAL_PREFIX: &str = "adyen-individual";
pub const INDIVIDUAL_PHOTO_ID: &str = "adyen-individual-photoid";
pub const INDIVIDUAL_PHOTO_ID_REAR: &str = "adyen-individual-photoid-rear";

pub fn ubo_photo_id(ubo_number: u32) -> String {
    format!("adyen-ubo{}-photoid", ubo_number)
}

pub fn ubo_photo_id_rear(ubo_number: u32) -> String {
    format!("adyen-ubo{}-photoid-rear", ubo_number)
}

pub const NO_UBO_MAPPING: &str = "No shareholder mapping found for ubo";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Mirakl error: {0}")]
    Mirakl(#[from] MiraklError),

    #[error("Adyen error: {0}")]
    Adyen(#[from] AdyenError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No shareholder mapping found for shareholder code: {0}")]
    NoShareholderMapping(String),

    #[error("No bank accounts are associated with this shop, a bank account is needed to upload a bank statement")]
    MissingBankAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    BankProof,
    CompanyRegistration,
    IndividualPhotoId { rear: bool },
    UboPhotoId { ubo_number: u32, rear: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentSettings {
    pub max_ubos: u32,
    pub max_doc_retries: i32,
    /// Uploads are marked `PASSED` so the test platform auto-verifies them
    pub test_environment: bool,
}

pub struct DocumentService {
    mirakl: Arc<dyn MiraklApi>,
    adyen: Arc<dyn AdyenApi>,
    deltas: DeltaService,
    mappings: ShareholderMappingService,
    retries: Arc<dyn DocRetryRepository>,
    settings: DocumentSettings,
}

impl DocumentService {
    pub fn new(
        mirakl: Arc<dyn MiraklApi>,
        adyen: Arc<dyn AdyenApi>,
        deltas: DeltaService,
        mappings: ShareholderMappingService,
        retries: Arc<dyn DocRetryRepository>,
        settings: DocumentSettings,
    ) -> Self {
        Self {
            mirakl,
            adyen,
            deltas,
            mappings,
            retries,
            settings,
        }
    }

    fn classify(&self, type_code: &str) -> Option<DocumentKind> {
        match type_code {
            BANK_PROOF => return Some(DocumentKind::BankProof),
            COMPANY_REGISTRATION => return Some(DocumentKind::CompanyRegistration),
            INDIVIDUAL_PHOTO_ID => return Some(DocumentKind::IndividualPhotoId { rear: false }),
            INDIVIDUAL_PHOTO_ID_REAR => return Some(DocumentKind::IndividualPhotoId { rear: true }),
            _ => {}
        }

        (1..=self.settings.max_ubos).find_map(|ubo_number| {
            if type_code == ubo_photo_id(ubo_number) {
                Some(DocumentKind::UboPhotoId { ubo_number, rear: false })
            } else if type_code == ubo_photo_id_rear(ubo_number) {
                Some(DocumentKind::UboPhotoId { ubo_number, rear: true })
            } else {
                None
            }
        })
    }

    pub async fn process_updated_documents(&self) -> Result<usize, DocumentError> {
        let before = Utc::now();
        let updated_since = self.deltas.get_document_delta().await?;

        let documents = self.mirakl.get_shop_documents(&[], updated_since).await?;
        info!(count = documents.len(), "Retrieved updated documents");

        let uploaded = self.process_docs(&documents).await?;

        self.deltas.update_document_delta(before).await?;
        Ok(uploaded)
    }

    /// Upload every recognised document; returns how many went through
    pub async fn process_docs(&self, documents: &[ShopDocument]) -> Result<usize, DocumentError> {
        let in_batch: HashSet<(&str, &str)> = documents
            .iter()
            .map(|doc| (doc.shop_id.as_str(), doc.type_code.as_str()))
            .collect();

        let mut uploaded = 0;
        for doc in documents {
            let Some(kind) = self.classify(&doc.type_code) else {
                debug!(doc_id = %doc.id, type_code = %doc.type_code, "Ignoring document type");
                continue;
            };

            let (document_type, shareholder_code) = match kind {
                DocumentKind::BankProof => (DocumentType::BankStatement, None),
                DocumentKind::CompanyRegistration => (DocumentType::CompanyRegistrationScreening, None),
                DocumentKind::IndividualPhotoId { rear } => (
                    photo_id_type(rear, in_batch.contains(&(doc.shop_id.as_str(), INDIVIDUAL_PHOTO_ID_REAR))),
                    None,
                ),
                DocumentKind::UboPhotoId { ubo_number, rear } => {
                    let mapping = self
                        .mappings
                        .find_by_shop_and_ubo(&doc.shop_id, ubo_number as i32)
                        .await?;
                    let Some(mapping) = mapping else {
                        warn!(doc_id = %doc.id, shop_id = %doc.shop_id, ubo_number, "{}", NO_UBO_MAPPING);
                        self.store_doc_retry(doc, NO_UBO_MAPPING).await?;
                        continue;
                    };
                    let rear_type = ubo_photo_id_rear(ubo_number);
                    let rear_in_batch = in_batch.contains(&(doc.shop_id.as_str(), rear_type.as_str()));
                    (photo_id_type(rear, rear_in_batch), Some(mapping.adyen_shareholder_code))
                }
            };

            if self.update_document(doc, document_type, shareholder_code).await? {
                uploaded += 1;
            }
        }

        Ok(uploaded)
    }

    /// Returns false when the upload failed and a retry entry was stored
    pub async fn update_document(
        &self,
        doc: &ShopDocument,
        document_type: DocumentType,
        shareholder_code: Option<String>,
    ) -> Result<bool, DocumentError> {
        match self.upload(doc, document_type, shareholder_code).await {
            Ok(()) => {
                self.retries.delete_by_doc_id(&doc.id).await?;
                info!(doc_id = %doc.id, shop_id = %doc.shop_id, %document_type, "Document uploaded");
                Ok(true)
            }
            Err(e) => {
                warn!(doc_id = %doc.id, shop_id = %doc.shop_id, error = %e, "Document upload failed");
                self.store_doc_retry(doc, &e.to_string()).await?;
                Ok(false)
            }
        }
    }

    async fn upload(
        &self,
        doc: &ShopDocument,
        document_type: DocumentType,
        shareholder_code: Option<String>,
    ) -> Result<(), DocumentError> {
        let downloaded = self.mirakl.download_document(&doc.id).await?;

        let bank_account_uuid = if document_type == DocumentType::BankStatement {
            let holder = self.adyen.get_account_holder(&doc.shop_id).await?;
            let uuid = holder
                .bank_account_uuids()
                .into_iter()
                .next()
                .ok_or(DocumentError::MissingBankAccount)?;
            Some(uuid)
        } else {
            None
        };

        let request = UploadDocumentRequest {
            document_content: STANDARD.encode(&downloaded.content),
            document_detail: DocumentDetail {
                account_holder_code: doc.shop_id.clone(),
                shareholder_code,
                bank_account_uuid,
                document_type,
                filename: downloaded.filename,
                description: self.settings.test_environment.then(|| "PASSED".to_string()),
            },
        };

        self.adyen.upload_document(request).await?;
        Ok(())
    }

    async fn store_doc_retry(&self, doc: &ShopDocument, error: &str) -> Result<(), DocumentError> {
        let retry = self.retries.record_failure(&doc.id, &doc.shop_id, error).await?;
        debug!(doc_id = %doc.id, times_failed = retry.times_failed, "Stored document retry");
        Ok(())
    }

    async fn retry_documents(&self, shop_ids: Vec<String>, doc_ids: HashSet<String>) -> Result<usize, DocumentError> {
        let documents: Vec<ShopDocument> = self
            .mirakl
            .get_shop_documents(&shop_ids, None)
            .await?
            .into_iter()
            .filter(|doc| doc_ids.contains(&doc.id))
            .collect();

        self.process_docs(&documents).await
    }

    pub async fn retry_failed_documents(&self) -> Result<usize, DocumentError> {
        let retries = self.retries.find_retryable(self.settings.max_doc_retries).await?;
        if retries.is_empty() {
            debug!("No failed documents to retry");
            return Ok(0);
        }

        info!(count = retries.len(), "Retrying failed documents");
        let shop_ids: Vec<String> = retries
            .iter()
            .map(|retry| retry.shop_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let doc_ids = retries.into_iter().map(|retry| retry.doc_id).collect();

        self.retry_documents(shop_ids, doc_ids).await
    }

    pub async fn retry_documents_for_shop(&self, shop_id: &str) -> Result<usize, DocumentError> {
        let retries = self.retries.find_by_shop(shop_id).await?;
        if retries.is_empty() {
            return Ok(0);
        }

        let doc_ids = retries.into_iter().map(|retry| retry.doc_id).collect();
        self.retry_documents(vec![shop_id.to_string()], doc_ids).await
    }

    async fn remove_documents<F>(&self, shop_id: &str, matches: F) -> Result<usize, DocumentError>
    where
        F: Fn(&str) -> bool,
    {
        let documents = self.mirakl.get_shop_documents(&[shop_id.to_string()], None).await?;

        let mut removed = 0;
        for doc in documents.iter().filter(|doc| matches(&doc.type_code)) {
            self.mirakl.delete_document(&doc.id).await?;
            removed += 1;
        }

        info!(shop_id = %shop_id, removed, "Removed marketplace documents");
        Ok(removed)
    }

    pub async fn remove_mirakl_media_for_shareholder(&self, shareholder_code: &str) -> Result<usize, DocumentError> {
        let mapping = self
            .mappings
            .find_by_shareholder_code(shareholder_code)
            .await?
            .ok_or_else(|| DocumentError::NoShareholderMapping(shareholder_code.to_string()))?;

        let prefix = format!("adyen-ubo{}-", mapping.mirakl_ubo_number);
        self.remove_documents(&mapping.mirakl_shop_id, |type_code| type_code.starts_with(&prefix))
            .await
    }

    pub async fn remove_mirakl_media_for_individual(&self, shop_id: &str) -> Result<usize, DocumentError> {
        self.remove_documents(shop_id, |type_code| type_code.starts_with(INDIVIDUAL_PREFIX))
            .await
    }

    pub async fn remove_mirakl_media_for_bank_proof(&self, shop_id: &str) -> Result<usize, DocumentError> {
        self.remove_documents(shop_id, |type_code| type_code == BANK_PROOF).await
    }
}

/// A rear side in the same batch turns the front into an ID card; a lone front is a passport
fn photo_id_type(rear: bool, rear_in_batch: bool) -> DocumentType {
    match (rear, rear_in_batch) {
        (true, _) => DocumentType::IdCardBack,
        (false, true) => DocumentType::IdCardFront,
        (false, false) => DocumentType::Passport,
    }
}
