mod balance_test;
mod bulk_load_test;
