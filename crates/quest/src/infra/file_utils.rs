use std::{fs, path::Path};

use log::info;

pub fn create_folder(folder_path: &str) {
    let path = Path::new(folder_path);

    if !path.exists() {
        match fs::create_dir_all(path) {
            Ok(_) => info!("Folder created: {}", folder_path),
            Err(e) => log::error!("Error creating folder {}: {}", folder_path, e),
        }
    } else {
        info!("Folder already exists: {}", folder_path);
    }
}
