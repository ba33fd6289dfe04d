pub mod gallery_service;
pub mod page_controller;
