use std::future::Future;

use serde::{Deserialize, Serialize};
use starfall_types::AccountId;
use thiserror::Error;
use tracing::debug;

/// One purchasable reward unit in the external catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gift {
    pub id: String,
    pub price: u64,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("gift service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gift service rejected the request: {0}")]
    Rejected(String),
}

/// Looks up reward units by exact price.
pub trait Catalog: Send + Sync {
    fn find_by_price(
        &self,
        price: u64,
    ) -> impl Future<Output = Result<Option<Gift>, CatalogError>> + Send;
}

/// Purchases and delivers a reward unit to a beneficiary.
pub trait Delivery: Send + Sync {
    fn deliver(
        &self,
        beneficiary: AccountId,
        gift: &Gift,
    ) -> impl Future<Output = Result<(), CatalogError>> + Send;
}

#[derive(Deserialize)]
struct GiftListing {
    gifts: Vec<Gift>,
}

#[derive(Serialize)]
struct SendGift<'a> {
    gift_id: &'a str,
    recipient: AccountId,
}

/// HTTP client for the external gift service.
///
/// Price lookup is two-stage: the market listing first, then units the
/// service account already owns.
#[derive(Clone)]
pub struct HttpGiftService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGiftService {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn listing(&self, path: &str) -> Result<Vec<Gift>, CatalogError> {
        let url = format!("{}/{}", self.base_url, path);
        let listing: GiftListing = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(listing.gifts)
    }
}

impl Catalog for HttpGiftService {
    async fn find_by_price(&self, price: u64) -> Result<Option<Gift>, CatalogError> {
        // Market first; the structure of either listing may drift, so a
        // miss here is a normal outcome, not an error.
        for path in ["gifts/market", "gifts/owned"] {
            match self.listing(path).await {
                Ok(gifts) => {
                    if let Some(gift) = gifts.into_iter().find(|g| g.price == price) {
                        debug!(gift = gift.id, price, source = path, "catalog match");
                        return Ok(Some(gift));
                    }
                }
                Err(err) => {
                    debug!(source = path, error = %err, "catalog listing failed");
                }
            }
        }
        Ok(None)
    }
}

impl Delivery for HttpGiftService {
    async fn deliver(&self, beneficiary: AccountId, gift: &Gift) -> Result<(), CatalogError> {
        let url = format!("{}/gifts/send", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SendGift {
                gift_id: &gift.id,
                recipient: beneficiary,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Rejected(format!("{status}: {body}")));
        }
        Ok(())
    }
}
