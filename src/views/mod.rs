pub mod gallery_page;
