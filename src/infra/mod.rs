pub mod controller;
pub mod kubernetes;
pub mod web;
