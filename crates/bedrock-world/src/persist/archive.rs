//! `.mcworld` archives.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::Path;

use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::PersistError;

/// Archive extension.
pub const ARCHIVE_EXTENSION: &str = "mcworld";

/// Zip the contents of `folder` into `dest`. Entry names are relative to
/// `folder` with `/` separators. Returns the number of files written.
pub fn zip_folder(folder: &Path, dest: &Path) -> Result<usize, PersistError> {
    let file = BufWriter::new(File::create(dest)?);
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let written = add_dir(&mut zip, folder, "", options)?;
    zip.finish()?;
    Ok(written)
}

fn add_dir(
    zip: &mut ZipWriter<BufWriter<File>>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<usize, PersistError> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut written = 0;
    for entry in entries {
        let name = format!("{prefix}{}", entry.file_name().to_string_lossy());
        if entry.file_type()?.is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
            written += add_dir(zip, &entry.path(), &format!("{name}/"), options)?;
        } else {
            zip.start_file(name, options)?;
            io::copy(&mut File::open(entry.path())?, zip)?;
            written += 1;
        }
    }
    Ok(written)
}
