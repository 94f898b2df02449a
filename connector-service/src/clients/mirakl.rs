//! Operator-side client for the Mirakl marketplace API

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, Response, StatusCode};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::debug;

use crate::config::MiraklConfig;
use crate::models::mirakl::{
    DownloadedDocument, GetShopsRequest, ManualAccountingDocument, ManualAccountingDocumentLine,
    ManualAccountingDocumentReturn, ManualAccountingDocumentReturns, ManualCreditRequest, ShopDocument,
    ShopDocuments, Shops,
};

#[derive(Debug, thiserror::Error)]
pub enum MiraklError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mirakl API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MiraklApi: Send + Sync {
    async fn get_shops(&self, request: GetShopsRequest) -> Result<Shops, MiraklError>;

    async fn get_shop_documents(
        &self,
        shop_ids: &[String],
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ShopDocument>, MiraklError>;

    async fn download_document(&self, document_id: &str) -> Result<DownloadedDocument, MiraklError>;

    async fn delete_document(&self, document_id: &str) -> Result<(), MiraklError>;

    async fn create_manual_credit(
        &self,
        shop_id: &str,
        currency: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<ManualAccountingDocumentReturn, MiraklError>;
}

pub struct MiraklClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl MiraklClient {
    pub fn new(config: &MiraklConfig) -> Result<Self, MiraklError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.operator_api_key.clone(),
            page_size: config.page_size,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: Response) -> Result<Response, MiraklError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(MiraklError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Pull the filename out of `attachment; filename="x.pdf"`
fn filename_from_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

#[async_trait]
impl MiraklApi for MiraklClient {
    async fn get_shops(&self, request: GetShopsRequest) -> Result<Shops, MiraklError> {
        let mut query = vec![
            ("offset", request.offset.to_string()),
            ("max", request.max.unwrap_or(self.page_size).to_string()),
            ("paginate", request.paginate.to_string()),
        ];
        if let Some(updated_since) = request.updated_since {
            query.push(("updated_since", format_date(updated_since)));
        }
        if !request.shop_ids.is_empty() {
            query.push(("shop_ids", request.shop_ids.join(",")));
        }

        debug!(offset = request.offset, "Fetching shops");

        let response = self
            .http_client
            .get(self.url("/api/shops"))
            .header(header::AUTHORIZATION, &self.api_key)
            .header(header::ACCEPT, "application/json")
            .query(&query)
            .send()
            .await?;

        Ok(Self::check(response).await?.json::<Shops>().await?)
    }

    async fn get_shop_documents(
        &self,
        shop_ids: &[String],
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ShopDocument>, MiraklError> {
        let mut query = Vec::new();
        if !shop_ids.is_empty() {
            query.push(("shop_ids", shop_ids.join(",")));
        }
        if let Some(updated_since) = updated_since {
            query.push(("updated_since", format_date(updated_since)));
        }

        let response = self
            .http_client
            .get(self.url("/api/shops/documents"))
            .header(header::AUTHORIZATION, &self.api_key)
            .header(header::ACCEPT, "application/json")
            .query(&query)
            .send()
            .await?;

        let documents = Self::check(response).await?.json::<ShopDocuments>().await?;
        Ok(documents.documents)
    }

    async fn download_document(&self, document_id: &str) -> Result<DownloadedDocument, MiraklError> {
        if document_id.trim().is_empty() {
            return Err(MiraklError::InvalidRequest("document id is empty".to_string()));
        }

        let response = self
            .http_client
            .get(self.url("/api/shops/documents/download"))
            .header(header::AUTHORIZATION, &self.api_key)
            .query(&[("document_ids", document_id)])
            .send()
            .await?;

        let response = Self::check(response).await?;
        let filename = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| document_id.to_string());
        let content = response.bytes().await?;

        Ok(DownloadedDocument { filename, content })
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), MiraklError> {
        let response = self
            .http_client
            .delete(self.url(&format!("/api/shops/documents/{}", document_id)))
            .header(header::AUTHORIZATION, &self.api_key)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn create_manual_credit(
        &self,
        shop_id: &str,
        currency: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<ManualAccountingDocumentReturn, MiraklError> {
        let shop_id: i64 = shop_id
            .parse()
            .map_err(|_| MiraklError::InvalidRequest(format!("shop id is not numeric: {}", shop_id)))?;

        let request = ManualCreditRequest {
            invoices: vec![ManualAccountingDocument {
                shop_id,
                document_type: "MANUAL_CREDIT".to_string(),
                currency_iso_code: currency.to_string(),
                description: description.to_string(),
                lines: vec![ManualAccountingDocumentLine {
                    amount,
                    description: description.to_string(),
                    quantity: 1,
                }],
            }],
        };

        let response = self
            .http_client
            .post(self.url("/api/invoices"))
            .header(header::AUTHORIZATION, &self.api_key)
            .json(&request)
            .send()
            .await?;

        let response = Self::check(response).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(ManualAccountingDocumentReturn::default());
        }

        let returns = response.json::<ManualAccountingDocumentReturns>().await?;
        Ok(returns
            .manual_accounting_documents_returns
            .into_iter()
            .next()
            .unwrap_or_default())
    }
}
