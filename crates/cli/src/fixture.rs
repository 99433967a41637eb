//! JSON description of the program registry, loaded into memory at startup.
//!
//! ```json
//! {
//!   "brands": [{ "name": "Acme", "prefix": "AC" }],
//!   "clients": [{
//!     "client_number": "1001",
//!     "name": "Stavebniny Novák",
//!     "contracts": [{
//!       "date_from": "2025-01-01",
//!       "date_to": "2025-12-31",
//!       "bonuses": [{ "brand": "Acme", "points_ratio": 0.5 }],
//!       "goals": [{
//!         "from": "2025-01-01", "to": "2025-12-31", "brands": ["Acme"],
//!         "goal_value": 10000, "goal_base": 0, "evaluation_frequency": 6,
//!         "bonus_percentage": 0.5, "allow_full_period_recovery": true
//!       }]
//!     }]
//!   }]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use serde::Deserialize;

use bonus_goals::{ExtraGoal, GoalId};
use bonus_infra::store::{InMemoryRegistry, Registry};
use bonus_parties::{Brand, BrandBonus, BrandBonusId, BrandId, Client, ClientId, Contract, ContractId};

#[derive(Debug, Deserialize)]
pub struct RegistryFixture {
    #[serde(default)]
    pub brands: Vec<BrandFixture>,
    #[serde(default)]
    pub clients: Vec<ClientFixture>,
}

#[derive(Debug, Deserialize)]
pub struct BrandFixture {
    pub name: String,
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct ClientFixture {
    pub client_number: String,
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub contracts: Vec<ContractFixture>,
}

#[derive(Debug, Deserialize)]
pub struct ContractFixture {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default)]
    pub bonuses: Vec<BonusFixture>,
    #[serde(default)]
    pub goals: Vec<GoalFixture>,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct BonusFixture {
    /// Brand name as listed under `brands`.
    pub brand: String,
    pub points_ratio: f64,
}

#[derive(Debug, Deserialize)]
pub struct GoalFixture {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub brands: Vec<String>,
    pub goal_value: i64,
    #[serde(default)]
    pub goal_base: i64,
    pub evaluation_frequency: u32,
    pub bonus_percentage: f64,
    #[serde(default)]
    pub allow_full_period_recovery: bool,
}

impl RegistryFixture {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading registry fixture {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing registry fixture {}", path.display()))
    }

    /// Validate every record through its constructor and store it.
    pub fn load(self) -> anyhow::Result<Arc<InMemoryRegistry>> {
        let registry = InMemoryRegistry::arc();

        let mut brand_ids: HashMap<String, BrandId> = HashMap::new();
        for brand in self.brands {
            let record = Brand::new(BrandId::new(), brand.name.clone(), brand.prefix)?;
            brand_ids.insert(brand.name, record.id);
            registry.save_brand(record)?;
        }
        let brand = |name: &str| {
            brand_ids
                .get(name)
                .copied()
                .ok_or_else(|| anyhow!("unknown brand '{name}'"))
        };

        for client in self.clients {
            let mut record = Client::new(ClientId::new(), client.client_number.clone(), client.name)?;
            if let Some(region) = client.region {
                record = record.with_region(region);
            }
            let client_id = record.id;
            registry.save_client(record)?;

            for contract in client.contracts {
                let bonuses = contract
                    .bonuses
                    .iter()
                    .map(|b| -> anyhow::Result<BrandBonus> {
                        Ok(BrandBonus::new(
                            BrandBonusId::new(),
                            b.brand.clone(),
                            brand(&b.brand)?,
                            b.points_ratio,
                        )?)
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                let mut record = Contract::new(
                    ContractId::new(),
                    client_id,
                    contract.date_from,
                    contract.date_to,
                    bonuses,
                )
                .with_context(|| format!("contract of client {}", client.client_number))?;
                if !contract.is_active {
                    record = record.deactivated();
                }
                let contract_id = record.id;
                registry.save_contract(record)?;

                for goal in contract.goals {
                    let brands = goal
                        .brands
                        .iter()
                        .map(|name| brand(name))
                        .collect::<anyhow::Result<Vec<_>>>()?;
                    registry.save_goal(
                        ExtraGoal::new(
                            GoalId::new(),
                            contract_id,
                            goal.from,
                            goal.to,
                            brands,
                            goal.goal_value,
                            goal.goal_base,
                            goal.evaluation_frequency,
                            goal.bonus_percentage,
                            goal.allow_full_period_recovery,
                        )
                        .with_context(|| format!("goal of client {}", client.client_number))?,
                    )?;
                }
            }
        }

        Ok(registry)
    }
}
