pub mod commissions;
pub mod deposits;
pub mod email;
pub mod mpesa;
pub mod otps;
pub mod users;
pub mod wallets;
pub mod withdrawals;
