pub mod app_init;
pub mod archive_pattern;
pub mod backup_config;
pub mod change_detector;
pub mod classifier;
pub mod destination;
pub mod facade;
pub mod found_file;
pub mod log_follower;
pub mod logging;
pub mod metadata;
pub mod result_error;
pub mod retention;
pub mod scanner;
pub mod target;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
