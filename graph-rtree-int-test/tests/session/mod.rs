mod batch_atomicity_test;
mod concurrency_test;
