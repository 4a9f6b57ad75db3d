use mirage::{dir, symlink};
use std::io::ErrorKind;
use std::path::PathBuf;

#[test]
fn reads_follow_symlinks() {
    let spec = mirage::TreeSpec::new()
        .entry("/data/real.txt", "the real thing")
        .entry("/alias", symlink("/data/real.txt"));
    mirage::activate(spec).unwrap();

    assert_eq!(
        mirage::fs::read_to_string("/alias").unwrap(),
        "the real thing"
    );

    // Writing through the link mutates the target.
    mirage::fs::write("/alias", "replaced").unwrap();
    assert_eq!(mirage::fs::read("/data/real.txt").unwrap(), b"replaced");
    mirage::restore();
}

#[test]
fn relative_targets_resolve_from_the_link_directory() {
    let spec = mirage::TreeSpec::new()
        .entry("/a/target.txt", "found me")
        .entry("/a/b/up", symlink("../target.txt"))
        .entry("/a/sibling", symlink("target.txt"));
    mirage::activate(spec).unwrap();

    assert_eq!(mirage::fs::read("/a/b/up").unwrap(), b"found me");
    assert_eq!(mirage::fs::read("/a/sibling").unwrap(), b"found me");
    mirage::restore();
}

#[test]
fn stat_follows_lstat_does_not() {
    let spec = mirage::TreeSpec::new()
        .entry("/file", "x")
        .entry("/link", symlink("/file"));
    mirage::activate(spec).unwrap();

    assert!(mirage::fs::metadata("/link").unwrap().is_file());
    let lstat = mirage::fs::symlink_metadata("/link").unwrap();
    assert!(lstat.is_symlink());
    assert_eq!(lstat.permissions().mode(), 0o777);
    mirage::restore();
}

#[test]
fn dangling_links_are_representable() {
    mirage::activate(mirage::TreeSpec::new().entry("/ghost", symlink("/nowhere"))).unwrap();

    // The link itself exists...
    assert!(mirage::fs::symlink_metadata("/ghost").unwrap().is_symlink());
    assert_eq!(
        mirage::fs::read_link("/ghost").unwrap(),
        PathBuf::from("/nowhere")
    );

    // ...but resolution through it fails only at resolve time.
    assert!(!mirage::fs::exists("/ghost"));
    let err = mirage::fs::read("/ghost").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!mirage::fs::try_exists("/ghost").unwrap());
    mirage::restore();
}

#[test]
fn symlink_cycles_report_a_loop() {
    let spec = mirage::TreeSpec::new()
        .entry("/a", symlink("/b"))
        .entry("/b", symlink("/a"));
    mirage::activate(spec).unwrap();

    let err = mirage::fs::read("/a").unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::ELOOP));
    assert_eq!(err.kind(), ErrorKind::FilesystemLoop);

    // The links themselves are still inspectable.
    assert!(mirage::fs::symlink_metadata("/a").unwrap().is_symlink());
    mirage::restore();
}

#[test]
fn links_to_directories_traverse() {
    let spec = mirage::TreeSpec::new()
        .entry("/srv/site/index.html", "<html>")
        .entry("/current", symlink("/srv/site"));
    mirage::activate(spec).unwrap();

    assert_eq!(
        mirage::fs::read("/current/index.html").unwrap(),
        b"<html>"
    );
    assert!(mirage::fs::metadata("/current").unwrap().is_dir());

    // A trailing slash forces following even for lstat-like consumers.
    assert!(mirage::fs::symlink_metadata("/current/").unwrap().is_dir());
    mirage::restore();
}

#[test]
fn unlink_removes_the_link_not_the_target() {
    let spec = mirage::TreeSpec::new()
        .entry("/kept.txt", "target stays")
        .entry("/doomed", symlink("/kept.txt"));
    mirage::activate(spec).unwrap();

    mirage::fs::remove_file("/doomed").unwrap();
    assert!(!mirage::fs::exists("/doomed"));
    assert_eq!(mirage::fs::read("/kept.txt").unwrap(), b"target stays");
    mirage::restore();
}

#[test]
fn created_at_runtime_and_renamed() {
    mirage::activate(mirage::TreeSpec::new().entry("/dir", dir())).unwrap();
    mirage::fs::write("/dir/file", "content").unwrap();

    mirage::fs::symlink("file", "/dir/rel").unwrap();
    assert_eq!(mirage::fs::read("/dir/rel").unwrap(), b"content");
    assert_eq!(
        mirage::fs::read_link("/dir/rel").unwrap(),
        PathBuf::from("file")
    );

    // Renaming moves the link itself; its stored target is unchanged, so
    // resolution now starts from the new directory.
    mirage::fs::create_dir("/other").unwrap();
    mirage::fs::rename("/dir/rel", "/other/rel").unwrap();
    assert_eq!(
        mirage::fs::read_link("/other/rel").unwrap(),
        PathBuf::from("file")
    );
    let err = mirage::fs::read("/other/rel").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = mirage::fs::symlink("x", "/dir/rel/deeper").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    mirage::restore();
}

#[test]
fn read_link_on_non_links_is_invalid() {
    mirage::activate([("/plain", "file")]).unwrap();
    let err = mirage::fs::read_link("/plain").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    mirage::restore();
}

#[test]
fn trailing_slash_on_files_is_rejected() {
    mirage::activate([("/file.txt", "x")]).unwrap();
    let err = mirage::fs::metadata("/file.txt/").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotADirectory);
    mirage::restore();
}

#[test]
fn canonicalize_resolves_links_and_dots() {
    let spec = mirage::TreeSpec::new()
        .entry("/data/file.txt", "hello")
        .entry("/shortcut", symlink("/data/file.txt"));
    mirage::activate(spec).unwrap();

    assert_eq!(
        mirage::fs::canonicalize("/shortcut").unwrap(),
        PathBuf::from("/data/file.txt")
    );
    assert_eq!(
        mirage::fs::canonicalize("/data/../data/./file.txt").unwrap(),
        PathBuf::from("/data/file.txt")
    );
    mirage::restore();
}

#[test]
fn chain_budget_is_configurable() {
    let spec = mirage::TreeSpec::new()
        .entry("/target", "end of the line")
        .entry("/l1", symlink("/target"))
        .entry("/l2", symlink("/l1"))
        .entry("/l3", symlink("/l2"));
    let mut builder = mirage::Builder::new();
    builder.max_symlinks(2);
    builder.activate(spec).unwrap();

    assert_eq!(mirage::fs::read("/l2").unwrap(), b"end of the line");
    let err = mirage::fs::read("/l3").unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::ELOOP));
    mirage::restore();
}
