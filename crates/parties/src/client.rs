use serde::{Deserialize, Serialize};

use bonus_core::{DomainError, DomainResult, Entity, entity_id};

entity_id!(
    /// Client identifier (internal).
    ClientId
);

/// A program member with a points account.
///
/// Invoices reference clients by `client_number`, the customer number of the
/// ERP, because invoices may be imported before the client is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub client_number: String,
    pub name: String,
    pub region: Option<String>,
}

impl Client {
    pub fn new(id: ClientId, client_number: impl Into<String>, name: impl Into<String>) -> DomainResult<Self> {
        let client_number = client_number.into().trim().to_string();
        if client_number.is_empty() {
            return Err(DomainError::validation("client number must not be empty"));
        }
        Ok(Self {
            id,
            client_number,
            name: name.into(),
            region: None,
        })
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

impl Entity for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
