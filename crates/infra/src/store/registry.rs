use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bonus_goals::{ExtraGoal, GoalId};
use bonus_parties::{Brand, BrandCatalog, Client, ClientId, Contract, ContractId};

use super::StoreError;

/// Clients, brands, contracts and goals, maintained by the surrounding
/// administration; read by accrual and evaluation.
pub trait Registry: Send + Sync {
    fn client(&self, id: ClientId) -> Result<Option<Client>, StoreError>;
    /// Look up by the ERP customer number invoices are keyed by.
    fn client_by_number(&self, client_number: &str) -> Result<Option<Client>, StoreError>;
    fn clients(&self) -> Result<Vec<Client>, StoreError>;
    fn brands(&self) -> Result<Vec<Brand>, StoreError>;
    fn contract(&self, id: ContractId) -> Result<Option<Contract>, StoreError>;
    fn contracts_for_client(&self, client_id: ClientId) -> Result<Vec<Contract>, StoreError>;
    fn goal(&self, id: GoalId) -> Result<Option<ExtraGoal>, StoreError>;
    fn goals(&self) -> Result<Vec<ExtraGoal>, StoreError>;

    fn save_client(&self, client: Client) -> Result<(), StoreError>;
    fn save_brand(&self, brand: Brand) -> Result<(), StoreError>;
    fn save_contract(&self, contract: Contract) -> Result<(), StoreError>;
    fn save_goal(&self, goal: ExtraGoal) -> Result<(), StoreError>;

    /// Fresh prefix lookup for one batch.
    fn brand_catalog(&self) -> Result<BrandCatalog, StoreError> {
        Ok(BrandCatalog::new(self.brands()?))
    }
}

impl<S> Registry for Arc<S>
where
    S: Registry + ?Sized,
{
    fn client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        (**self).client(id)
    }

    fn client_by_number(&self, client_number: &str) -> Result<Option<Client>, StoreError> {
        (**self).client_by_number(client_number)
    }

    fn clients(&self) -> Result<Vec<Client>, StoreError> {
        (**self).clients()
    }

    fn brands(&self) -> Result<Vec<Brand>, StoreError> {
        (**self).brands()
    }

    fn contract(&self, id: ContractId) -> Result<Option<Contract>, StoreError> {
        (**self).contract(id)
    }

    fn contracts_for_client(&self, client_id: ClientId) -> Result<Vec<Contract>, StoreError> {
        (**self).contracts_for_client(client_id)
    }

    fn goal(&self, id: GoalId) -> Result<Option<ExtraGoal>, StoreError> {
        (**self).goal(id)
    }

    fn goals(&self) -> Result<Vec<ExtraGoal>, StoreError> {
        (**self).goals()
    }

    fn save_client(&self, client: Client) -> Result<(), StoreError> {
        (**self).save_client(client)
    }

    fn save_brand(&self, brand: Brand) -> Result<(), StoreError> {
        (**self).save_brand(brand)
    }

    fn save_contract(&self, contract: Contract) -> Result<(), StoreError> {
        (**self).save_contract(contract)
    }

    fn save_goal(&self, goal: ExtraGoal) -> Result<(), StoreError> {
        (**self).save_goal(goal)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    clients: HashMap<ClientId, Client>,
    brands: Vec<Brand>,
    contracts: HashMap<ContractId, Contract>,
    goals: HashMap<GoalId, ExtraGoal>,
}

/// In-memory registry for tests/dev and the CLI fixture.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    inner: RwLock<RegistryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Registry for InMemoryRegistry {
    fn client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        Ok(self.inner.read()?.clients.get(&id).cloned())
    }

    fn client_by_number(&self, client_number: &str) -> Result<Option<Client>, StoreError> {
        let state = self.inner.read()?;
        Ok(state
            .clients
            .values()
            .find(|c| c.client_number == client_number.trim())
            .cloned())
    }

    fn clients(&self) -> Result<Vec<Client>, StoreError> {
        let mut clients: Vec<Client> = self.inner.read()?.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.client_number.cmp(&b.client_number));
        Ok(clients)
    }

    fn brands(&self) -> Result<Vec<Brand>, StoreError> {
        Ok(self.inner.read()?.brands.clone())
    }

    fn contract(&self, id: ContractId) -> Result<Option<Contract>, StoreError> {
        Ok(self.inner.read()?.contracts.get(&id).cloned())
    }

    fn contracts_for_client(&self, client_id: ClientId) -> Result<Vec<Contract>, StoreError> {
        let state = self.inner.read()?;
        let mut contracts: Vec<Contract> = state
            .contracts
            .values()
            .filter(|c| c.client_id == client_id)
            .cloned()
            .collect();
        contracts.sort_by_key(|c| c.date_from);
        Ok(contracts)
    }

    fn goal(&self, id: GoalId) -> Result<Option<ExtraGoal>, StoreError> {
        Ok(self.inner.read()?.goals.get(&id).cloned())
    }

    fn goals(&self) -> Result<Vec<ExtraGoal>, StoreError> {
        let mut goals: Vec<ExtraGoal> = self.inner.read()?.goals.values().cloned().collect();
        goals.sort_by_key(|g| (g.goal_period_from, g.id));
        Ok(goals)
    }

    fn save_client(&self, client: Client) -> Result<(), StoreError> {
        let mut state = self.inner.write()?;
        if let Some(existing) = state
            .clients
            .values()
            .find(|c| c.client_number == client.client_number && c.id != client.id)
        {
            return Err(StoreError::AlreadyExists(format!(
                "client number {} ({})",
                existing.client_number, existing.id
            )));
        }
        super::put(&mut state.clients, client);
        Ok(())
    }

    fn save_brand(&self, brand: Brand) -> Result<(), StoreError> {
        let mut state = self.inner.write()?;
        match state.brands.iter_mut().find(|b| b.id == brand.id) {
            Some(slot) => *slot = brand,
            None => state.brands.push(brand),
        }
        Ok(())
    }

    fn save_contract(&self, contract: Contract) -> Result<(), StoreError> {
        let mut state = self.inner.write()?;
        if !state.clients.contains_key(&contract.client_id) {
            return Err(StoreError::NotFound(format!("client {}", contract.client_id)));
        }
        super::put(&mut state.contracts, contract);
        Ok(())
    }

    fn save_goal(&self, goal: ExtraGoal) -> Result<(), StoreError> {
        let mut state = self.inner.write()?;
        if !state.contracts.contains_key(&goal.contract_id) {
            return Err(StoreError::NotFound(format!("contract {}", goal.contract_id)));
        }
        super::put(&mut state.goals, goal);
        Ok(())
    }
}
