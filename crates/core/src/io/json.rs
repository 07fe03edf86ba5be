//! Pretty-printed JSON documents on disk.
//!
//! Writes go to a sibling temporary file first and are moved into place with
//! a rename, so a reader never observes a half-written document.

use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Read and deserialize a JSON file.
pub fn read_json<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(|e| Error::io_at(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::json_at(path, e))
}

/// Like [`read_json`], but a missing file yields `Ok(None)`.
pub fn read_json_opt<T, P>(path: P) -> Result<Option<T>>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    match fs::File::open(path) {
        Ok(file) => serde_json::from_reader(BufReader::new(file))
            .map(Some)
            .map_err(|e| Error::json_at(path, e)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io_at(path, e)),
    }
}

/// Serialize `value` as indented UTF-8 JSON (non-ASCII kept verbatim).
pub fn write_json<T, P>(path: P, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    replace_file(path, |w| {
        serde_json::to_writer_pretty(&mut *w, value).map_err(|e| Error::json_at(path, e))?;
        w.write_all(b"\n").map_err(|e| Error::io_at(path, e))
    })
}

/// Write a small text file (e.g. the last-processed marker).
pub fn write_text<P: AsRef<Path>>(path: P, contents: &str) -> Result<()> {
    let path = path.as_ref();
    replace_file(path, |w| {
        w.write_all(contents.as_bytes())
            .map_err(|e| Error::io_at(path, e))
    })
}

fn replace_file<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<fs::File>) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);

    let file = fs::File::create(tmp).map_err(|e| Error::io_at(tmp, e))?;
    let mut writer = BufWriter::new(file);
    fill(&mut writer)?;
    writer.flush().map_err(|e| Error::io_at(tmp, e))?;
    drop(writer);

    fs::rename(tmp, path).map_err(|e| Error::io_at(path, e))
}
