// tests/no_direct_sheet_writes.rs
// Fails if a transformation reaches into the sheet instead of returning its
// outputs. Only the runner writes results back.

use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = fs::read_dir(dir) {
        for e in entries.flatten() {
            let p = e.path();
            if p.is_dir() {
                collect_rs_files(&p, files);
            } else if p.extension().map(|s| s == "rs").unwrap_or(false) {
                files.push(p);
            }
        }
    }
}

fn is_whitelisted(path: &Path) -> bool {
    let p = path.to_string_lossy();
    // Test doubles may build sheets
    p.ends_with("/testing.rs") || p.ends_with("\\testing.rs")
}

#[test]
fn transformations_do_not_touch_the_sheet() {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let src_dir = Path::new(manifest_dir).join("src").join("transformations");

    let mut files = Vec::new();
    collect_rs_files(&src_dir, &mut files);
    assert!(!files.is_empty(), "no transformation sources found under {:?}", src_dir);

    let bad_patterns = [
        "SheetSession",
        "SheetWorkspace",
        "sheets::sheet",
        "sheets::resources",
        "sheets::row_store",
        "sheets::column_registry",
        "RowStore",
        "ColumnRegistry",
        "set_cell(",
        "set_cells(",
    ];

    let mut offenders: Vec<(String, String)> = Vec::new();

    for file in files {
        if is_whitelisted(&file) { continue; }
        let content = match fs::read_to_string(&file) {
            Ok(c) => c,
            Err(_) => continue,
        };

        for pat in &bad_patterns {
            if content.contains(pat) {
                offenders.push((file.to_string_lossy().to_string(), pat.to_string()));
            }
        }
    }

    if !offenders.is_empty() {
        let mut msg = String::from("Transformations writing to the sheet directly:\n");
        for (file, pat) in offenders {
            msg.push_str(&format!("  {} contains pattern '{}': return the value from execute instead\n", file, pat));
        }
        panic!("{}", msg);
    }
}
