/// Files created by [`setup_test_dir`], relative to `foo`.
pub const TEST_FILES: &[&str] = &[
    "0.txt",
    "README",
    ".hidden",
    "bar/1.TXT",
    "bar/2.jpg",
    "bar/3.tar.gz",
    "baz/4.txt",
    "baz/deep/5.Jpg",
];

pub fn setup_test_dir() -> anyhow::Result<tempfile::TempDir> {
    // foo
    // |- 0.txt
    // |- README
    // |- .hidden
    // |- bar
    //    |- 1.TXT
    //    |- 2.jpg
    //    |- 3.tar.gz
    // |- baz
    //    |- 4.txt
    //    |- deep
    //       |- 5.Jpg
    // |- empty
    let tmp_dir = tempfile::tempdir()?;
    let foo_path = tmp_dir.path().join("foo");
    for file in TEST_FILES {
        let path = foo_path.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, file)?;
    }
    std::fs::create_dir(foo_path.join("empty"))?;
    Ok(tmp_dir)
}

/// Map of `bucket/name` to file content for everything under `root`, two levels deep.
pub fn read_sorted_tree(
    root: &std::path::Path,
) -> anyhow::Result<std::collections::BTreeMap<String, String>> {
    let mut tree = std::collections::BTreeMap::new();
    for bucket in std::fs::read_dir(root)? {
        let bucket = bucket?;
        anyhow::ensure!(
            bucket.file_type()?.is_dir(),
            "{:?} is not a bucket directory",
            bucket.path()
        );
        for file in std::fs::read_dir(bucket.path())? {
            let file = file?;
            let key = format!(
                "{}/{}",
                bucket.file_name().to_string_lossy(),
                file.file_name().to_string_lossy()
            );
            tree.insert(key, std::fs::read_to_string(file.path())?);
        }
    }
    Ok(tree)
}
