pub mod cards;
pub mod gateway;
pub mod ledger;

pub use cards::CardVaultService;
pub use gateway::{MockGateway, PaymentGateway};
pub use ledger::PaymentLedgerService;
