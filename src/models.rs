pub mod commissions;
pub mod deposits;
pub mod mpesa;
pub mod otps;
pub mod users;
pub mod wallets;
pub mod withdrawals;
