use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use bonus_core::{DomainError, DomainResult, Entity, Money, entity_id};

use crate::brand::BrandId;
use crate::client::ClientId;

entity_id!(
    /// Contract identifier.
    ContractId
);

entity_id!(
    /// Brand bonus rule identifier.
    BrandBonusId
);

/// Named rule: `points_ratio` points per currency unit of turnover in a brand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandBonus {
    pub id: BrandBonusId,
    pub name: String,
    pub brand_id: BrandId,
    /// E.g. 0.5 means 5 points for 10 units of turnover.
    pub points_ratio: f64,
}

impl BrandBonus {
    pub fn new(
        id: BrandBonusId,
        name: impl Into<String>,
        brand_id: BrandId,
        points_ratio: f64,
    ) -> DomainResult<Self> {
        if !points_ratio.is_finite() || points_ratio < 0.0 {
            return Err(DomainError::validation(format!(
                "points ratio must be a non-negative number, got {points_ratio}"
            )));
        }
        Ok(Self {
            id,
            name: name.into(),
            brand_id,
            points_ratio,
        })
    }

    /// Points for a brand turnover, truncated toward zero.
    pub fn points_for(&self, amount: Money) -> i64 {
        amount.points_at(self.points_ratio)
    }
}

/// A client's agreement: validity window, active flag and bonus schedule.
///
/// Terms are never edited in place; a change deactivates the old contract and
/// creates a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub client_id: ClientId,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub is_active: bool,
    pub bonuses: Vec<BrandBonus>,
}

impl Contract {
    pub fn new(
        id: ContractId,
        client_id: ClientId,
        date_from: NaiveDate,
        date_to: NaiveDate,
        bonuses: Vec<BrandBonus>,
    ) -> DomainResult<Self> {
        if date_to <= date_from {
            return Err(DomainError::validation(
                "contract end date must be after start date",
            ));
        }
        Ok(Self {
            id,
            client_id,
            date_from,
            date_to,
            is_active: true,
            bonuses,
        })
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Active and `date` inside `[date_from, date_to]`.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.is_active && self.date_from <= date && date <= self.date_to
    }

    pub fn bonus_for(&self, brand_id: BrandId) -> Option<&BrandBonus> {
        self.bonuses.iter().find(|b| b.brand_id == brand_id)
    }

    pub fn has_bonuses(&self) -> bool {
        !self.bonuses.is_empty()
    }
}

impl Entity for Contract {
    type Id = ContractId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// The client's contract active on `date`, if any.
///
/// Zero matches is a normal outcome (no points for that date). More than one
/// match breaks the one-active-contract rule and is reported instead of
/// silently picking one.
pub fn select_active_contract<'a, I>(
    contracts: I,
    client_id: ClientId,
    date: NaiveDate,
) -> DomainResult<Option<&'a Contract>>
where
    I: IntoIterator<Item = &'a Contract>,
{
    let mut found: Option<&Contract> = None;
    for contract in contracts
        .into_iter()
        .filter(|c| c.client_id == client_id && c.is_active_on(date))
    {
        if let Some(first) = found {
            return Err(DomainError::invariant(format!(
                "client {client_id} has more than one active contract on {date} ({} and {})",
                first.id, contract.id
            )));
        }
        found = Some(contract);
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn contract(client_id: ClientId, from: NaiveDate, to: NaiveDate) -> Contract {
        Contract::new(ContractId::new(), client_id, from, to, Vec::new()).unwrap()
    }

    #[test]
    fn contract_window_is_inclusive() {
        let c = contract(ClientId::new(), d(2025, 1, 1), d(2025, 12, 31));
        assert!(c.is_active_on(d(2025, 1, 1)));
        assert!(c.is_active_on(d(2025, 12, 31)));
        assert!(!c.is_active_on(d(2026, 1, 1)));
        assert!(!c.clone().deactivated().is_active_on(d(2025, 6, 1)));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let err = Contract::new(
            ContractId::new(),
            ClientId::new(),
            d(2025, 1, 1),
            d(2025, 1, 1),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn negative_or_nan_ratio_is_rejected() {
        assert!(BrandBonus::new(BrandBonusId::new(), "x", BrandId::new(), -0.1).is_err());
        assert!(BrandBonus::new(BrandBonusId::new(), "x", BrandId::new(), f64::NAN).is_err());
    }

    #[test]
    fn selects_the_single_active_contract() {
        let client = ClientId::new();
        let old = contract(client, d(2024, 1, 1), d(2024, 12, 31));
        let current = contract(client, d(2025, 1, 1), d(2025, 12, 31));
        let superseded = contract(client, d(2025, 1, 1), d(2025, 12, 31)).deactivated();
        let other_client = contract(ClientId::new(), d(2025, 1, 1), d(2025, 12, 31));
        let all = [old, current.clone(), superseded, other_client];

        let picked = select_active_contract(&all, client, d(2025, 3, 3)).unwrap();
        assert_eq!(picked.map(|c| c.id), Some(current.id));
        assert!(select_active_contract(&all, client, d(2023, 3, 3)).unwrap().is_none());
    }

    #[test]
    fn two_active_contracts_are_an_integrity_error() {
        let client = ClientId::new();
        let all = [
            contract(client, d(2025, 1, 1), d(2025, 12, 31)),
            contract(client, d(2025, 6, 1), d(2026, 5, 31)),
        ];
        let err = select_active_contract(&all, client, d(2025, 7, 1)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert!(select_active_contract(&all, client, d(2025, 2, 1)).unwrap().is_some());
    }

    #[test]
    fn bonus_lookup_by_brand() {
        let brand = BrandId::new();
        let bonus = BrandBonus::new(BrandBonusId::new(), "Alpha 0.5", brand, 0.5).unwrap();
        let c = Contract::new(
            ContractId::new(),
            ClientId::new(),
            d(2025, 1, 1),
            d(2025, 12, 31),
            vec![bonus],
        )
        .unwrap();
        assert_eq!(c.bonus_for(brand).map(|b| b.points_for(Money::from_major(999))), Some(499));
        assert!(c.bonus_for(BrandId::new()).is_none());
    }
}
