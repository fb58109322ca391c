pub mod replicate;
pub mod webui;
