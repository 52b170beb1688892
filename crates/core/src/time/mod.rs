pub mod accrual;
