pub mod currencies;
pub mod rates;
pub mod refresh;
pub mod setup;
pub mod ui;
