pub mod checkpoint_tests;
