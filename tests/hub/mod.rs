mod fanout_tests;
mod persistence_tests;
mod subscription_tests;
