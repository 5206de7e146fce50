mod concurrency;
mod configuration;
mod lifecycle;
mod scenarios;
