use common::Error;

/// Rejects destinations that cannot name a new file: `.`, `..` and paths ending in `/.` or `/..`.
pub fn validate_destination_path(dst_path_str: &str) -> Result<(), Error> {
    // check the raw string, Path::file_name() normalizes these away
    if dst_path_str.ends_with("/.") || dst_path_str == "." {
        return Err(Error::argument(
            "Destination path cannot be the current directory, use './' to copy into it",
        ));
    }
    if dst_path_str.ends_with("/..") || dst_path_str == ".." {
        return Err(Error::argument(
            "Destination path cannot be the parent directory, use '../' to copy into it",
        ));
    }
    Ok(())
}

/// Applies trailing slash semantics: "foo/bar -> baz/" becomes "foo/bar -> baz/bar".
pub fn resolve_destination_path(src_path_str: &str, dst_path_str: &str) -> Result<String, Error> {
    validate_destination_path(dst_path_str)?;
    if !dst_path_str.ends_with('/') {
        return Ok(dst_path_str.to_string());
    }
    let src_path = std::path::Path::new(src_path_str);
    let src_file_name = src_path.file_name().ok_or_else(|| {
        Error::argument(format!(
            "Source path {src_path_str} does not have a basename"
        ))
    })?;
    let resolved_dst = std::path::Path::new(dst_path_str).join(src_file_name);
    Ok(resolved_dst.to_string_lossy().to_string())
}

/// Resolves symlinks and relative components; the source must exist.
pub fn canonicalize_source(src: &str) -> Result<std::path::PathBuf, Error> {
    std::fs::canonicalize(src).map_err(|err| Error::from_io(err, src))
}

/// Canonicalizes the destination's parent directory and re-attaches the file name, since the
/// destination itself must not exist yet.
pub fn canonicalize_destination(dst: &str) -> Result<std::path::PathBuf, Error> {
    let dst_path = std::path::Path::new(dst);
    let file_name = dst_path
        .file_name()
        .ok_or_else(|| Error::argument(format!("Destination path {dst} does not name a file")))?;
    let parent = match dst_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => std::path::Path::new("."),
    };
    let parent = std::fs::canonicalize(parent)
        .map_err(|err| Error::from_io(err, parent.display().to_string()))?;
    Ok(parent.join(file_name))
}
