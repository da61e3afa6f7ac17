pub mod cash_service;
pub mod expense_service;
pub mod portfolio_service;
pub mod refresh_service;
pub mod valuation_service;
