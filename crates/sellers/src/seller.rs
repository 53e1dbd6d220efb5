use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marketpay_core::{Aggregate, AggregateRoot, LedgerError, SellerId};
use marketpay_events::Event;

/// Aggregate root: Seller.
///
/// Holds identity and display profile only. Money never lives here: balances
/// are derived from the seller's account stream, and the denormalized balance
/// cache is a read model owned by infra.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seller {
    id: SellerId,
    display_name: String,
    version: u64,
    created: bool,
}

impl Seller {
    /// Empty aggregate for rehydration.
    pub fn empty(id: SellerId) -> Self {
        Self {
            id,
            display_name: String::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SellerId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Seller {
    type Id = SellerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterSeller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSeller {
    pub seller_id: SellerId,
    pub display_name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenameSeller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameSeller {
    pub seller_id: SellerId,
    pub display_name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellerCommand {
    RegisterSeller(RegisterSeller),
    RenameSeller(RenameSeller),
}

/// Event: SellerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerRegistered {
    pub seller_id: SellerId,
    pub display_name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SellerRenamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerRenamed {
    pub seller_id: SellerId,
    pub display_name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellerEvent {
    SellerRegistered(SellerRegistered),
    SellerRenamed(SellerRenamed),
}

impl Event for SellerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SellerEvent::SellerRegistered(_) => "sellers.seller.registered",
            SellerEvent::SellerRenamed(_) => "sellers.seller.renamed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SellerEvent::SellerRegistered(e) => e.occurred_at,
            SellerEvent::SellerRenamed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Seller {
    type Command = SellerCommand;
    type Event = SellerEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SellerEvent::SellerRegistered(e) => {
                self.id = e.seller_id;
                self.display_name = e.display_name.clone();
                self.created = true;
            }
            SellerEvent::SellerRenamed(e) => {
                self.display_name = e.display_name.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SellerCommand::RegisterSeller(cmd) => self.handle_register(cmd),
            SellerCommand::RenameSeller(cmd) => self.handle_rename(cmd),
        }
    }
}

impl Seller {
    fn ensure_seller_id(&self, seller_id: SellerId) -> Result<(), LedgerError> {
        if self.id != seller_id {
            return Err(LedgerError::conflict("seller_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterSeller) -> Result<Vec<SellerEvent>, LedgerError> {
        if self.created {
            return Err(LedgerError::conflict("seller already registered"));
        }

        if cmd.display_name.trim().is_empty() {
            return Err(LedgerError::validation("display_name must not be empty"));
        }

        Ok(vec![SellerEvent::SellerRegistered(SellerRegistered {
            seller_id: cmd.seller_id,
            display_name: cmd.display_name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rename(&self, cmd: &RenameSeller) -> Result<Vec<SellerEvent>, LedgerError> {
        if !self.created {
            return Err(LedgerError::not_found());
        }
        self.ensure_seller_id(cmd.seller_id)?;

        if cmd.display_name.trim().is_empty() {
            return Err(LedgerError::validation("display_name must not be empty"));
        }

        Ok(vec![SellerEvent::SellerRenamed(SellerRenamed {
            seller_id: cmd.seller_id,
            display_name: cmd.display_name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_seller_id() -> SellerId {
        SellerId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn register_seller_emits_registered_event() {
        let seller_id = test_seller_id();
        let seller = Seller::empty(seller_id);

        let cmd = RegisterSeller {
            seller_id,
            display_name: "Acme Outlet".to_string(),
            occurred_at: test_time(),
        };

        let events = seller
            .handle(&SellerCommand::RegisterSeller(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            SellerEvent::SellerRegistered(e) => {
                assert_eq!(e.seller_id, seller_id);
                assert_eq!(e.display_name, "Acme Outlet");
            }
            _ => panic!("Expected SellerRegistered event"),
        }
    }

    #[test]
    fn cannot_register_twice() {
        let seller_id = test_seller_id();
        let mut seller = Seller::empty(seller_id);

        let cmd = RegisterSeller {
            seller_id,
            display_name: "Acme Outlet".to_string(),
            occurred_at: test_time(),
        };
        let events = seller
            .handle(&SellerCommand::RegisterSeller(cmd.clone()))
            .unwrap();
        seller.apply(&events[0]);

        let err = seller
            .handle(&SellerCommand::RegisterSeller(cmd))
            .unwrap_err();
        match err {
            LedgerError::Conflict(msg) if msg.contains("already registered") => {}
            _ => panic!("Expected Conflict for duplicate registration"),
        }
    }

    #[test]
    fn blank_display_name_is_rejected() {
        let seller_id = test_seller_id();
        let seller = Seller::empty(seller_id);

        let cmd = RegisterSeller {
            seller_id,
            display_name: "   ".to_string(),
            occurred_at: test_time(),
        };

        let err = seller
            .handle(&SellerCommand::RegisterSeller(cmd))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn rename_requires_registration() {
        let seller_id = test_seller_id();
        let seller = Seller::empty(seller_id);

        let cmd = RenameSeller {
            seller_id,
            display_name: "New Name".to_string(),
            occurred_at: test_time(),
        };

        let err = seller
            .handle(&SellerCommand::RenameSeller(cmd))
            .unwrap_err();
        assert_eq!(err, LedgerError::NotFound);
    }

    #[test]
    fn rename_updates_display_name() {
        let seller_id = test_seller_id();
        let mut seller = Seller::empty(seller_id);

        let register = RegisterSeller {
            seller_id,
            display_name: "Acme Outlet".to_string(),
            occurred_at: test_time(),
        };
        let events = seller
            .handle(&SellerCommand::RegisterSeller(register))
            .unwrap();
        seller.apply(&events[0]);

        let rename = RenameSeller {
            seller_id,
            display_name: "Acme Outlet GmbH".to_string(),
            occurred_at: test_time(),
        };
        let events = seller
            .handle(&SellerCommand::RenameSeller(rename))
            .unwrap();
        seller.apply(&events[0]);

        assert_eq!(seller.display_name(), "Acme Outlet GmbH");
        assert_eq!(seller.version(), 2);
    }
}
