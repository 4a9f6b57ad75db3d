use mirage::{dir, file};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt};

fn activate_scratch() {
    mirage::activate(mirage::TreeSpec::new().entry("/scratch", dir())).unwrap();
}

#[test]
fn write_then_read_round_trips() {
    activate_scratch();

    let mut f = mirage::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open("/scratch/data.bin")
        .unwrap();
    f.write_all(b"one two three").unwrap();

    // Same descriptor, rewound.
    f.seek(SeekFrom::Start(0)).unwrap();
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"one two three");

    // Fresh descriptor.
    assert_eq!(mirage::fs::read("/scratch/data.bin").unwrap(), b"one two three");
    mirage::restore();
}

#[test]
fn truncate_to_zero_reads_empty() {
    activate_scratch();
    mirage::fs::write("/scratch/t", "not for long").unwrap();

    let f = mirage::fs::OpenOptions::new()
        .write(true)
        .open("/scratch/t")
        .unwrap();
    f.set_len(0).unwrap();
    drop(f);

    assert_eq!(mirage::fs::read("/scratch/t").unwrap(), b"");
    mirage::restore();
}

#[test]
fn positional_io_zero_fills_gaps() {
    activate_scratch();
    let f = mirage::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open("/scratch/sparse")
        .unwrap();

    f.write_at(b"tail", 8).unwrap();
    assert_eq!(f.metadata().unwrap().len(), 12);

    let mut buf = [0u8; 12];
    assert_eq!(f.read_at(&mut buf, 0).unwrap(), 12);
    assert_eq!(&buf, b"\0\0\0\0\0\0\0\0tail");

    // Short read past the end of content.
    let mut big = [0u8; 64];
    assert_eq!(f.read_at(&mut big, 8).unwrap(), 4);
    mirage::restore();
}

#[test]
fn append_mode_writes_at_the_end() {
    activate_scratch();
    mirage::fs::write("/scratch/log", "line1\n").unwrap();

    let mut f = mirage::fs::OpenOptions::new()
        .append(true)
        .open("/scratch/log")
        .unwrap();
    f.seek(SeekFrom::Start(0)).unwrap();
    f.write_all(b"line2\n").unwrap();

    assert_eq!(mirage::fs::read("/scratch/log").unwrap(), b"line1\nline2\n");
    mirage::restore();
}

#[test]
fn seek_before_start_is_invalid() {
    activate_scratch();
    mirage::fs::write("/scratch/s", "abc").unwrap();
    let mut f = mirage::fs::File::open("/scratch/s").unwrap();
    let err = f.seek(SeekFrom::Current(-10)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    mirage::restore();
}

#[test]
fn reads_require_a_readable_descriptor() {
    activate_scratch();
    let mut f = mirage::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .open("/scratch/wo")
        .unwrap();
    let mut buf = [0u8; 4];
    let err = f.read(&mut buf).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EBADF));

    let mut ro = mirage::fs::File::open("/scratch/wo").unwrap();
    let err = ro.write(b"x").unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    mirage::restore();
}

#[test]
fn mkdir_semantics() {
    activate_scratch();

    mirage::fs::create_dir("/scratch/sub").unwrap();
    let err = mirage::fs::create_dir("/scratch/sub").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let err = mirage::fs::create_dir("/scratch/missing/sub").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    mirage::fs::create_dir_all("/scratch/a/b/c").unwrap();
    assert!(mirage::fs::metadata("/scratch/a/b/c").unwrap().is_dir());
    // Idempotent.
    mirage::fs::create_dir_all("/scratch/a/b/c").unwrap();

    let mut builder = mirage::fs::DirBuilder::new();
    std::os::unix::fs::DirBuilderExt::mode(builder.recursive(true), 0o700);
    builder.create("/scratch/deep/private").unwrap();
    assert_eq!(
        mirage::fs::metadata("/scratch/deep/private")
            .unwrap()
            .permissions()
            .mode(),
        0o700
    );
    mirage::restore();
}

#[test]
fn rmdir_and_unlink_semantics() {
    activate_scratch();
    mirage::fs::create_dir("/scratch/d").unwrap();
    mirage::fs::write("/scratch/d/f", "x").unwrap();

    let err = mirage::fs::remove_dir("/scratch/d").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DirectoryNotEmpty);

    let err = mirage::fs::remove_dir("/scratch/d/f").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotADirectory);

    let err = mirage::fs::remove_file("/scratch/d").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IsADirectory);

    mirage::fs::remove_file("/scratch/d/f").unwrap();
    mirage::fs::remove_dir("/scratch/d").unwrap();
    assert!(!mirage::fs::exists("/scratch/d"));

    mirage::fs::create_dir_all("/scratch/tree/inner").unwrap();
    mirage::fs::write("/scratch/tree/inner/f", "x").unwrap();
    mirage::fs::remove_dir_all("/scratch/tree").unwrap();
    assert!(!mirage::fs::exists("/scratch/tree"));
    mirage::restore();
}

#[test]
fn rename_matrix() {
    activate_scratch();
    mirage::fs::write("/scratch/f1", "first").unwrap();
    mirage::fs::write("/scratch/f2", "second").unwrap();
    mirage::fs::create_dir("/scratch/empty").unwrap();
    mirage::fs::create_dir("/scratch/full").unwrap();
    mirage::fs::write("/scratch/full/occupant", "x").unwrap();

    // File over file replaces.
    mirage::fs::rename("/scratch/f1", "/scratch/f2").unwrap();
    assert_eq!(mirage::fs::read("/scratch/f2").unwrap(), b"first");
    assert!(!mirage::fs::exists("/scratch/f1"));

    // File over directory refuses.
    let err = mirage::fs::rename("/scratch/f2", "/scratch/empty").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IsADirectory);

    // Directory over non-empty directory refuses.
    let err = mirage::fs::rename("/scratch/empty", "/scratch/full").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DirectoryNotEmpty);

    // Directory over file refuses.
    let err = mirage::fs::rename("/scratch/full", "/scratch/f2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotADirectory);

    // Directory over empty directory replaces.
    mirage::fs::rename("/scratch/full", "/scratch/empty").unwrap();
    assert_eq!(
        mirage::fs::read("/scratch/empty/occupant").unwrap(),
        b"x"
    );

    // A directory cannot move into its own subtree.
    mirage::fs::create_dir("/scratch/empty/nested").unwrap();
    let err = mirage::fs::rename("/scratch/empty", "/scratch/empty/nested/in").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    // Rename to self is a no-op.
    mirage::fs::rename("/scratch/f2", "/scratch/f2").unwrap();
    assert_eq!(mirage::fs::read("/scratch/f2").unwrap(), b"first");
    mirage::restore();
}

#[test]
fn rename_preserves_node_identity() {
    activate_scratch();
    mirage::fs::write("/scratch/before", "payload").unwrap();
    let f = mirage::fs::File::open("/scratch/before").unwrap();

    mirage::fs::rename("/scratch/before", "/scratch/after").unwrap();

    // The open descriptor still reads the same node.
    let mut buf = [0u8; 7];
    assert_eq!(f.read_at(&mut buf, 0).unwrap(), 7);
    assert_eq!(&buf, b"payload");
    assert_eq!(mirage::fs::read("/scratch/after").unwrap(), b"payload");
    mirage::restore();
}

#[test]
fn hard_links_share_one_file() {
    activate_scratch();
    mirage::fs::write("/scratch/a", "shared").unwrap();
    mirage::fs::create_dir("/scratch/elsewhere").unwrap();
    mirage::fs::hard_link("/scratch/a", "/scratch/elsewhere/b").unwrap();

    assert_eq!(mirage::fs::metadata("/scratch/a").unwrap().nlink(), 2);

    // A write through one name is visible through the other.
    let mut f = mirage::fs::OpenOptions::new()
        .append(true)
        .open("/scratch/a")
        .unwrap();
    f.write_all(b" bytes").unwrap();
    drop(f);
    assert_eq!(
        mirage::fs::read("/scratch/elsewhere/b").unwrap(),
        b"shared bytes"
    );

    // Content survives until the last name goes.
    mirage::fs::remove_file("/scratch/a").unwrap();
    assert_eq!(
        mirage::fs::read("/scratch/elsewhere/b").unwrap(),
        b"shared bytes"
    );
    assert_eq!(
        mirage::fs::metadata("/scratch/elsewhere/b").unwrap().nlink(),
        1
    );
    mirage::fs::remove_file("/scratch/elsewhere/b").unwrap();
    assert!(!mirage::fs::exists("/scratch/elsewhere/b"));

    // Hard-linking a directory is refused.
    let err = mirage::fs::hard_link("/scratch", "/scratch/elsewhere/dirlink").unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EPERM));
    mirage::restore();
}

#[test]
fn unlinked_files_stay_alive_while_open() {
    activate_scratch();
    mirage::fs::write("/scratch/ghost", "still here").unwrap();
    let f = mirage::fs::File::open("/scratch/ghost").unwrap();

    mirage::fs::remove_file("/scratch/ghost").unwrap();
    assert!(!mirage::fs::exists("/scratch/ghost"));

    let mut buf = [0u8; 10];
    assert_eq!(f.read_at(&mut buf, 0).unwrap(), 10);
    assert_eq!(&buf, b"still here");
    drop(f);

    assert!(!mirage::fs::exists("/scratch/ghost"));
    mirage::restore();
}

#[test]
fn readdir_lists_in_creation_order() {
    activate_scratch();
    mirage::fs::write("/scratch/banana", "").unwrap();
    mirage::fs::write("/scratch/apple", "").unwrap();
    mirage::fs::create_dir("/scratch/cherry").unwrap();

    let names: Vec<String> = mirage::fs::read_dir("/scratch")
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, ["banana", "apple", "cherry"]);

    let kinds: Vec<bool> = mirage::fs::read_dir("/scratch")
        .unwrap()
        .map(|e| e.unwrap().file_type().unwrap().is_dir())
        .collect();
    assert_eq!(kinds, [false, false, true]);
    mirage::restore();
}

#[test]
fn permissions_are_enforced() {
    let spec = mirage::TreeSpec::new()
        .entry("/locked", dir().mode(0o600).entry("inside", "secret"))
        .entry("/readonly.txt", file().contents("look only").mode(0o444))
        .entry("/root-owned", file().contents("nope").mode(0o600).uid(0).gid(0));
    mirage::Builder::new().uid(1000).gid(1000).activate(spec).unwrap();

    // Traversal requires execute on intermediate directories.
    let err = mirage::fs::read("/locked/inside").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    // Mode bits gate opens.
    let err = mirage::fs::write("/readonly.txt", "scribble").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(mirage::fs::read("/readonly.txt").unwrap(), b"look only");

    let err = mirage::fs::read("/root-owned").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    // chmod by the owner opens the file up; chmod by others is refused.
    mirage::fs::set_permissions("/readonly.txt", mirage::fs::Permissions::from_mode(0o644))
        .unwrap();
    mirage::fs::write("/readonly.txt", "writable now").unwrap();

    let err =
        mirage::fs::set_permissions("/root-owned", mirage::fs::Permissions::from_mode(0o777))
            .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    // Unprivileged chown cannot take ownership.
    let err = mirage::fs::chown("/root-owned", Some(1000), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    mirage::restore();
}

#[test]
fn chmod_chown_do_not_revalidate_open_descriptors() {
    let spec = mirage::TreeSpec::new().entry("/data.txt", "payload");
    mirage::Builder::new().uid(1000).gid(1000).activate(spec).unwrap();

    let f = mirage::fs::File::open("/data.txt").unwrap();
    mirage::fs::set_permissions("/data.txt", mirage::fs::Permissions::from_mode(0o000)).unwrap();

    // New opens fail, the existing descriptor keeps its access.
    assert!(mirage::fs::read("/data.txt").is_err());
    let mut buf = [0u8; 7];
    assert_eq!(f.read_at(&mut buf, 0).unwrap(), 7);
    mirage::restore();
}

#[test]
fn descriptors_die_with_the_session() {
    activate_scratch();
    mirage::fs::write("/scratch/f", "bytes").unwrap();
    let mut f = mirage::fs::File::open("/scratch/f").unwrap();
    mirage::restore();

    let mut buf = [0u8; 5];
    let err = f.read(&mut buf).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    assert!(f.metadata().is_err());
}

#[test]
fn open_mode_bits_apply_to_new_files() {
    activate_scratch();
    let f = mirage::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .mode(0o640)
        .open("/scratch/modal")
        .unwrap();
    assert_eq!(f.metadata().unwrap().permissions().mode(), 0o640);
    drop(f);

    let err = mirage::fs::File::create_new("/scratch/modal").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    mirage::restore();
}

#[test]
fn copy_duplicates_content() {
    activate_scratch();
    mirage::fs::write("/scratch/src", "copy me").unwrap();
    let n = mirage::fs::copy("/scratch/src", "/scratch/dst").unwrap();
    assert_eq!(n, 7);
    assert_eq!(mirage::fs::read("/scratch/dst").unwrap(), b"copy me");

    // Independent nodes: mutating one leaves the other.
    mirage::fs::write("/scratch/dst", "changed").unwrap();
    assert_eq!(mirage::fs::read("/scratch/src").unwrap(), b"copy me");
    mirage::restore();
}

#[test]
fn metadata_reports_derived_sizes_and_times() {
    activate_scratch();
    mirage::fs::write("/scratch/sized", vec![0u8; 1536]).unwrap();
    let md = mirage::fs::metadata("/scratch/sized").unwrap();
    assert!(md.is_file());
    assert_eq!(md.len(), 1536);
    assert_eq!(md.size(), 1536);
    assert_eq!(md.blocks(), 3);
    assert_eq!(md.blksize(), 4096);
    assert!(md.modified().unwrap() <= std::time::SystemTime::now());

    let before = mirage::fs::metadata("/scratch/sized").unwrap();
    mirage::fs::write("/scratch/sized", "tiny").unwrap();
    let after = mirage::fs::metadata("/scratch/sized").unwrap();
    assert_eq!(after.len(), 4);
    assert!(after.modified().unwrap() >= before.modified().unwrap());
    mirage::restore();
}

#[test]
fn try_clone_reads_at_an_independent_cursor() {
    activate_scratch();
    mirage::fs::write("/scratch/c", "abcdef").unwrap();

    let mut one = mirage::fs::File::open("/scratch/c").unwrap();
    let mut buf = [0u8; 3];
    one.read_exact(&mut buf).unwrap();

    let mut two = one.try_clone().unwrap();
    let mut rest = Vec::new();
    two.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, b"def");

    // The original cursor did not move with the clone's reads.
    let mut again = [0u8; 3];
    one.read_exact(&mut again).unwrap();
    assert_eq!(&again, b"def");
    mirage::restore();
}
