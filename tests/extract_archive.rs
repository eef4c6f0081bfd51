use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use dataset_explorer::{
    DatasetError, FsPorts, LineProgressReporter, NoProgressReporter, extract_archive,
};

enum Entry<'a> {
    Dir(&'a str),
    File(&'a str, &'a str),
}

fn create_zip(path: &Path, entries: Vec<Entry>) -> Result<(), Box<dyn std::error::Error>> {
    let file = fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();

    for entry in entries {
        match entry {
            Entry::Dir(name) => zip.add_directory(name, options)?,
            Entry::File(name, contents) => {
                zip.start_file(name, options)?;
                zip.write_all(contents.as_bytes())?;
            }
        }
    }

    zip.finish()?;
    Ok(())
}

#[test]
fn extracts_files_and_directories() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("data.zip");
    let dest = temp_dir.path().join("out");

    create_zip(
        &zip_path,
        vec![
            Entry::Dir("dataset/"),
            Entry::Dir("dataset/empty/"),
            Entry::File("dataset/cats/a.jpg", "cat-a"),
            Entry::File("dataset/readme.txt", "hello"),
        ],
    )?;

    let ports = FsPorts::new();
    let progress = NoProgressReporter::new();
    let extraction = extract_archive(&ports, &progress, &zip_path, &dest)?;

    assert_eq!(extraction.destination, dest);
    assert!(dest.join("dataset").join("empty").is_dir());
    assert_eq!(fs::read_to_string(dest.join("dataset/cats/a.jpg"))?, "cat-a");
    assert_eq!(fs::read_to_string(dest.join("dataset/readme.txt"))?, "hello");
    assert_eq!(extraction.stats.entries, 4);
    assert_eq!(extraction.stats.directories_created, 2);
    assert_eq!(extraction.stats.files_written, 2);
    assert_eq!(extraction.stats.skipped, 0);

    Ok(())
}

#[test]
fn overwrites_existing_files() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("data.zip");
    let dest = temp_dir.path().join("out");
    fs::create_dir_all(&dest)?;
    fs::write(dest.join("note.txt"), "old contents that are longer")?;

    create_zip(&zip_path, vec![Entry::File("note.txt", "new")])?;

    let ports = FsPorts::new();
    let progress = NoProgressReporter::new();
    extract_archive(&ports, &progress, &zip_path, &dest)?;

    assert_eq!(fs::read_to_string(dest.join("note.txt"))?, "new");

    Ok(())
}

#[test]
fn skips_traversal_and_absolute_entries() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("evil.zip");
    let dest = temp_dir.path().join("work").join("dest");

    create_zip(
        &zip_path,
        vec![
            Entry::File("../../etc/passwd", "root:x"),
            Entry::File("/tmp/absolute.txt", "abs"),
            Entry::File("../dest-evil/payload.txt", "evil"),
            Entry::File("safe/ok.txt", "ok"),
        ],
    )?;

    let ports = FsPorts::new();
    let progress = NoProgressReporter::new();
    let extraction = extract_archive(&ports, &progress, &zip_path, &dest)?;

    assert_eq!(fs::read_to_string(dest.join("safe/ok.txt"))?, "ok");
    assert!(!temp_dir.path().join("work").join("dest-evil").exists());
    assert!(!temp_dir.path().join("etc").exists());
    assert_eq!(extraction.stats.skipped, 3);
    assert_eq!(extraction.stats.files_written, 1);

    Ok(())
}

#[test]
fn archive_with_only_unsafe_entries_leaves_empty_destination()
-> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("evil.zip");
    let dest = temp_dir.path().join("dest");

    create_zip(
        &zip_path,
        vec![
            Entry::File("../../etc/passwd", "root:x"),
            Entry::File("/etc/shadow", "nope"),
        ],
    )?;

    let ports = FsPorts::new();
    let progress = NoProgressReporter::new();
    let extraction = extract_archive(&ports, &progress, &zip_path, &dest)?;

    assert!(dest.is_dir());
    assert_eq!(fs::read_dir(&dest)?.count(), 0);
    assert_eq!(extraction.stats.skipped, 2);

    Ok(())
}

#[test]
fn malformed_archive_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("broken.zip");
    fs::write(&zip_path, b"not a zip")?;

    let ports = FsPorts::new();
    let progress = NoProgressReporter::new();
    let result = extract_archive(&ports, &progress, &zip_path, &temp_dir.path().join("dest"));

    assert!(matches!(result, Err(DatasetError::Zip(_))));

    Ok(())
}

#[test]
fn reports_skipped_entries_to_progress() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("evil.zip");
    let dest = temp_dir.path().join("dest");

    create_zip(
        &zip_path,
        vec![
            Entry::File("../escape.txt", "x"),
            Entry::File("fine.txt", "y"),
        ],
    )?;

    let ports = FsPorts::new();
    let progress = LineProgressReporter::with_writer(Cursor::new(Vec::new()));
    extract_archive(&ports, &progress, &zip_path, &dest)?;

    let output = String::from_utf8(progress.into_inner().into_inner())?;
    assert!(output.contains("extracting: "));
    assert!(output.contains("skipped entry: ../escape.txt (suspicious path)"));
    assert!(output.contains("entries: 2 files: 1 skipped: 1"));

    Ok(())
}
