pub mod warsaw;
