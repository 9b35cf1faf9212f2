//! Stored contract documents
//!
//! Order and dispute rows keep the full contract as protobuf-JSON text.
//! Only the fields needed to derive coin columns are modelled here; every
//! other field is ignored on decode. Both the camelCase names the contract
//! serializer emits and snake_case field names from older writers are accepted.

use crate::error::DocumentError;
use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit JSON `null` like an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A contract as stored in the datastore
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contract {
    #[serde(alias = "vendor_listings", deserialize_with = "null_as_default")]
    pub vendor_listings: Vec<Listing>,

    #[serde(alias = "buyer_order")]
    pub buyer_order: Option<Order>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Listing {
    pub metadata: Option<ListingMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingMetadata {
    #[serde(alias = "coin_type", deserialize_with = "null_as_default")]
    pub coin_type: String,

    #[serde(alias = "accepted_currencies", deserialize_with = "null_as_default")]
    pub accepted_currencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Order {
    pub payment: Option<Payment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Payment {
    #[serde(deserialize_with = "null_as_default")]
    pub coin: String,
}

impl Contract {
    /// Decode a contract from its stored JSON text
    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a contract stored as raw bytes (BLOB columns)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        let text = String::from_utf8(bytes.to_vec())?;
        Self::from_json(&text)
    }

    pub fn first_listing(&self) -> Option<&Listing> {
        self.vendor_listings.first()
    }

    /// Coin the buyer declared on the order's payment section, if any
    pub fn declared_payment_coin(&self) -> Option<&str> {
        self.buyer_order
            .as_ref()
            .and_then(|order| order.payment.as_ref())
            .map(|payment| payment.coin.as_str())
            .filter(|coin| !coin.is_empty())
    }
}

impl Listing {
    pub fn coin_type(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .map(|m| m.coin_type.as_str())
            .filter(|coin| !coin.is_empty())
    }

    pub fn accepted_currencies(&self) -> &[String] {
        self.metadata
            .as_ref()
            .map(|m| m.accepted_currencies.as_slice())
            .unwrap_or(&[])
    }
}
