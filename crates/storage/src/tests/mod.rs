mod helpers;

mod alloc_tests;
mod read_tests;
