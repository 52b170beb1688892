pub mod contract;
pub mod view;
pub mod window;
