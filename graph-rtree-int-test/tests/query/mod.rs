mod nearest_test;
mod search_test;
