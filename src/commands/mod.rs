pub mod check;
pub mod master;
