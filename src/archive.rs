use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::bundle::Bundle;
use crate::error::PackError;
use crate::merge::{ArchiveEntry, MergeConfig, Merger, Overlay};
use crate::utils::TempFile;

/// Permission bits of executable entries: `rwxr-xr-x`.
///
/// The zip writer adds the regular file type, so the external attributes
/// end up as `0o100755 << 16`.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Writes archive entries into a zip file.
///
/// The archive is assembled in a temporary file next to the destination and
/// only moved into place by [`PackHelper::commit`]. A helper that is dropped
/// without being committed closes the archive and deletes it.
pub struct PackHelper {
    zip: Option<ZipWriter<BufWriter<File>>>,
    tmp: TempFile,
    pb: ProgressBar,
}

impl PackHelper {
    /// Creates a pack helper writing to `dst`.
    ///
    /// `total_size` is the number of uncompressed bytes that will be written
    /// and only drives the progress display.
    pub fn create<P: AsRef<Path>>(dst: &P, total_size: Option<u64>) -> Result<PackHelper, PackError> {
        let dst = dst.as_ref();
        let tmp = TempFile::for_path(&dst).map_err(|err| PackError::io(dst, err))?;
        let file = File::create(tmp.path()).map_err(|err| PackError::io(dst, err))?;

        let pb = match total_size {
            Some(total_size) => {
                let pb = ProgressBar::new(total_size);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template(" {spinner} {bar:16.cyan.dim}  {wide_msg:.dim} {bytes}/{total_bytes} eta {eta}")
                        .progress_chars("█▉▊▋▌▍▎▏  ")
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(ProgressStyle::default_bar().template("{spinner}  {wide_msg:.dim}"));
                pb
            }
        };

        pb.enable_steady_tick(200);

        Ok(PackHelper {
            zip: Some(ZipWriter::new(BufWriter::new(file))),
            tmp,
            pb,
        })
    }

    /// Reports operating on an entry.
    pub fn report_entry(&mut self, name: &str) {
        self.pb.set_message(name);
    }

    /// Copies one entry into the archive.
    ///
    /// Every entry is deflated. Executable entries are stamped with
    /// [`EXECUTABLE_MODE`]; everything else keeps the writer's default
    /// permissions. All entries are recorded as created on a Unix host, which
    /// is what makes unzip honor the mode.
    pub fn write_entry(&mut self, entry: &ArchiveEntry) -> Result<(), PackError> {
        let mut options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        if entry.executable {
            options = options.unix_permissions(EXECUTABLE_MODE);
        }

        let mut src = File::open(&entry.source)
            .map(BufReader::new)
            .map_err(|err| PackError::io(&entry.source, err))?;

        debug!(
            "adding {}{}",
            entry.name,
            if entry.executable { " (executable)" } else { "" }
        );
        self.report_entry(&entry.name);

        let dst = self.tmp.path().to_path_buf();
        let zip = match self.zip {
            Some(ref mut zip) => zip,
            None => {
                return Err(PackError::io(
                    dst,
                    io::Error::new(io::ErrorKind::Other, "archive already closed"),
                ))
            }
        };
        zip.start_file(entry.name.as_str(), options)
            .map_err(|err| PackError::zip(&dst, err))?;

        // read errors name the source, everything else the archive
        let mut buf = [0; 131_072];
        loop {
            let len = match src.read(&mut buf) {
                Ok(0) => break,
                Ok(len) => len,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PackError::io(&entry.source, e)),
            };
            zip.write_all(&buf[..len])
                .map_err(|err| PackError::io(&dst, err))?;
            self.pb.inc(len as u64);
        }
        Ok(())
    }

    /// Finalizes the archive and moves it to its destination.
    ///
    /// Returns the absolute destination path.
    pub fn commit(mut self) -> Result<PathBuf, PackError> {
        self.pb.finish_and_clear();
        if let Some(mut zip) = self.zip.take() {
            let mut file = zip
                .finish()
                .map_err(|err| PackError::zip(self.tmp.path(), err))?;
            file.flush()
                .map_err(|err| PackError::io(self.tmp.path(), err))?;
        }
        let path = self
            .tmp
            .persist()
            .map_err(|err| PackError::io(self.tmp.path(), err))?;
        info!("wrote {}", path.display());
        Ok(path)
    }
}

impl Drop for PackHelper {
    fn drop(&mut self) {
        // the temp file is removed when `tmp` drops after this
        if let Some(mut zip) = self.zip.take() {
            zip.finish().ok();
        }
        self.pb.finish_and_clear();
    }
}

/// Packs `bundle` merged with `overlay` into a zip archive at `dst`.
///
/// Returns the absolute path of the written archive. On failure no archive
/// is left at `dst`.
pub fn pack<P: AsRef<Path>>(
    bundle: &Bundle,
    overlay: &Overlay,
    config: &MergeConfig,
    dst: &P,
) -> Result<PathBuf, PackError> {
    let entries = Merger::new(bundle, overlay, config).plan()?;
    debug!("packing {} entries", entries.len());

    let mut total_size = 0;
    for entry in &entries {
        let metadata =
            fs::metadata(&entry.source).map_err(|err| PackError::io(&entry.source, err))?;
        total_size += metadata.len();
    }

    let mut helper = PackHelper::create(dst, Some(total_size))?;
    for entry in &entries {
        helper.write_entry(entry)?;
    }
    helper.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::OverrideTable;
    use tempfile::TempDir;
    use zip::ZipArchive;

    /// Decodes `(name, host system, external attributes)` for every central
    /// directory record.
    fn central_directory(bytes: &[u8]) -> Vec<(String, u8, u32)> {
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]) as usize;
        let u32_at =
            |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let eocd = (0..=bytes.len() - 22)
            .rev()
            .find(|&i| &bytes[i..i + 4] == b"PK\x05\x06")
            .unwrap();
        let mut offset = u32_at(eocd + 16) as usize;
        let mut rv = vec![];
        for _ in 0..u16_at(eocd + 10) {
            assert_eq!(&bytes[offset..offset + 4], b"PK\x01\x02");
            let name_len = u16_at(offset + 28);
            let name = &bytes[offset + 46..offset + 46 + name_len];
            rv.push((
                String::from_utf8(name.to_vec()).unwrap(),
                bytes[offset + 5],
                u32_at(offset + 38),
            ));
            offset += 46 + name_len + u16_at(offset + 30) + u16_at(offset + 32);
        }
        rv
    }

    fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> (Vec<u8>, Option<u32>) {
        let mut file = archive.by_name(name).unwrap();
        let mut buf = vec![];
        file.read_to_end(&mut buf).unwrap();
        (buf, file.unix_mode())
    }

    #[test]
    fn test_pack_bundle() {
        let tmp = TempDir::new().unwrap();
        let app = tmp.path().join("Foo.app");
        fs::create_dir_all(app.join("Contents/MacOS")).unwrap();
        fs::write(app.join("Contents/Info.plist"), b"<plist version=\"1.0\"/>").unwrap();
        let build = tmp.path().join("build");
        fs::create_dir(&build).unwrap();
        let exe: Vec<u8> = (0..200_000u32).map(|x| (x % 251) as u8).collect();
        fs::write(build.join("Foo"), &exe).unwrap();
        fs::write(build.join("Foo.debug"), b"debug symbols").unwrap();

        let bundle = Bundle::open(&app).unwrap();
        let overlay = Overlay::open(&build, "Foo").unwrap();
        let mut config = MergeConfig::new("Foo");
        config.overrides = vec![("Foo.debug", "run.debug")].into_iter().collect::<OverrideTable>();
        let dst = tmp.path().join("dist").join("Foo.zip");
        let path = pack(&bundle, &overlay, &config, &dst).unwrap();
        assert_eq!(path, dst);

        let mut archive = ZipArchive::new(File::open(&dst).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);

        let (contents, mode) = read_entry(&mut archive, "Foo.app/Contents/Info.plist");
        assert_eq!(contents, b"<plist version=\"1.0\"/>");
        assert_eq!(mode.unwrap() & 0o111, 0);

        let (contents, mode) = read_entry(&mut archive, "Foo.app/Contents/MacOS/run.debug");
        assert_eq!(contents, b"debug symbols");
        assert_eq!(mode.unwrap() & 0o111, 0);

        let (contents, mode) = read_entry(&mut archive, "Foo.app/Contents/MacOS/Foo");
        assert_eq!(contents, exe);
        assert_eq!(mode, Some(0o100755));

        let records = central_directory(&fs::read(&dst).unwrap());
        assert_eq!(
            records.iter().map(|x| x.0.as_str()).collect::<Vec<_>>(),
            vec![
                "Foo.app/Contents/Info.plist",
                "Foo.app/Contents/MacOS/run.debug",
                "Foo.app/Contents/MacOS/Foo",
            ]
        );
        for (name, host, attrs) in &records {
            assert_eq!(*host, 3, "{} not marked as unix", name);
            if name.ends_with("/Foo") {
                assert_eq!(*attrs, 0o100755 << 16);
            } else {
                assert_eq!((*attrs >> 16) & 0o111, 0);
            }
        }
    }

    #[test]
    fn test_nested_build_output_keeps_directories() {
        let tmp = TempDir::new().unwrap();
        let app = tmp.path().join("Foo.app");
        fs::create_dir_all(app.join("Contents")).unwrap();
        fs::write(app.join("Contents/Info.plist"), b"<plist/>").unwrap();
        let build = tmp.path().join("build");
        fs::create_dir_all(build.join("runtimes/osx-x64")).unwrap();
        fs::write(build.join("Foo"), b"exe").unwrap();
        fs::write(build.join("runtimes/osx-x64/libfoo.dylib"), b"dylib").unwrap();

        let bundle = Bundle::open(&app).unwrap();
        let overlay = Overlay::open(&build, "Foo").unwrap();
        let dst = tmp.path().join("Foo.zip");
        pack(&bundle, &overlay, &MergeConfig::new("Foo"), &dst).unwrap();

        let mut archive = ZipArchive::new(File::open(&dst).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);
        let (contents, mode) = read_entry(
            &mut archive,
            "Foo.app/Contents/MacOS/runtimes/osx-x64/libfoo.dylib",
        );
        assert_eq!(contents, b"dylib");
        assert_eq!(mode.unwrap() & 0o111, 0);
        let (contents, mode) = read_entry(&mut archive, "Foo.app/Contents/MacOS/Foo");
        assert_eq!(contents, b"exe");
        assert_eq!(mode, Some(0o100755));
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("Foo.zip");
        let present = tmp.path().join("present");
        fs::write(&present, b"data").unwrap();

        let mut helper = PackHelper::create(&dst, None).unwrap();
        helper
            .write_entry(&ArchiveEntry::file(&present, "present".into()))
            .unwrap();
        let missing = tmp.path().join("missing");
        match helper.write_entry(&ArchiveEntry::executable(&missing, "missing".into())) {
            Err(PackError::Io { path, .. }) => assert_eq!(path, missing.display().to_string()),
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(()) => panic!("write of a missing file succeeded"),
        }
        drop(helper);

        assert!(!dst.exists());
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|x| x.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("present")]);
    }

    #[test]
    fn test_empty_archive() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("empty.zip");
        let helper = PackHelper::create(&dst, None).unwrap();
        helper.commit().unwrap();
        let archive = ZipArchive::new(File::open(&dst).unwrap()).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
