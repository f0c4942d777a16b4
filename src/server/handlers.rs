pub mod health;
pub mod xumm;
