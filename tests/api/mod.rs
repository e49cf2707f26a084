mod connect_tests;
mod health_tests;
