pub mod baskets;
pub mod capture;
pub mod requests;
pub mod responses;
pub mod system;
