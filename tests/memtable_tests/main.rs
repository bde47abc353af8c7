//! MemTable integration tests

mod table_tests;
