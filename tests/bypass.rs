use std::io::ErrorKind;

#[test]
fn runs_a_synchronous_function_using_the_real_filesystem() {
    let real = tempfile::NamedTempFile::new().unwrap();
    mirage::activate([("/path/to/file", "content")]).unwrap();

    assert_eq!(
        mirage::fs::read_to_string("/path/to/file").unwrap(),
        "content"
    );
    assert!(!mirage::fs::exists(real.path()));
    assert!(mirage::bypass(|| mirage::fs::exists(real.path())));

    assert!(!mirage::fs::exists(real.path()));
    mirage::restore();
}

#[test]
fn propagates_errors_unchanged() {
    mirage::activate([("/path/to/file", "content")]).unwrap();

    // The path exists virtually; the bypassed read fails against the real
    // backend and the error passes through untouched.
    assert!(mirage::fs::exists("/path/to/file"));
    let err = mirage::bypass(|| mirage::fs::read("/path/to/file")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));

    assert_eq!(
        mirage::fs::read_to_string("/path/to/file").unwrap(),
        "content"
    );
    mirage::restore();
}

#[test]
fn handles_functions_that_panic() {
    mirage::activate([("/path/to/file", "content")]).unwrap();

    let result = std::panic::catch_unwind(|| {
        mirage::bypass(|| {
            assert!(!mirage::fs::exists("/path/to/file"));
            panic!("oops");
        })
    });

    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"oops"));

    // Virtual mode is active again immediately after the unwind.
    assert_eq!(
        mirage::fs::read_to_string("/path/to/file").unwrap(),
        "content"
    );
    mirage::restore();
}

#[test]
fn bypasses_the_virtual_working_directory() {
    let real_cwd = std::env::current_dir().unwrap();
    mirage::activate(mirage::TreeSpec::new().entry("dir", mirage::dir())).unwrap();

    mirage::env::set_current_dir("dir").unwrap();
    assert_eq!(mirage::env::current_dir().unwrap(), real_cwd.join("dir"));

    mirage::bypass(|| {
        assert_eq!(mirage::env::current_dir().unwrap(), real_cwd);
    });
    assert_eq!(mirage::env::current_dir().unwrap(), real_cwd.join("dir"));

    mirage::restore();
    // The virtual chdir never touched the real process cwd.
    assert_eq!(std::env::current_dir().unwrap(), real_cwd);
}

#[test]
fn runs_a_deferred_operation_using_the_real_filesystem() {
    let real = tempfile::NamedTempFile::new().unwrap();
    mirage::activate([("/path/to/file", "content")]).unwrap();

    assert!(!mirage::fs::exists(real.path()));
    let pending = mirage::bypass(|| mirage::aio::metadata(real.path()));

    // Virtual mode is reinstated when bypass returns, before the deferred
    // operation settles.
    assert!(!mirage::fs::exists(real.path()));
    assert!(mirage::fs::exists("/path/to/file"));

    let stat = tokio_test::block_on(pending).unwrap();
    assert!(stat.is_file());
    assert!(!mirage::fs::exists(real.path()));
    mirage::restore();
}

#[test]
fn deferred_rejection_passes_through() {
    mirage::activate([("/path/to/file", "content")]).unwrap();

    // Virtually readable, really absent: the rejection proves the deferred
    // operation ran against the real backend.
    let pending = mirage::bypass(|| mirage::aio::read("/path/to/file"));
    assert_eq!(
        mirage::fs::read_to_string("/path/to/file").unwrap(),
        "content"
    );

    let err = tokio_test::block_on(pending).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(
        mirage::fs::read_to_string("/path/to/file").unwrap(),
        "content"
    );
    mirage::restore();
}

#[test]
fn deferred_settlement_does_not_reenter_bypass() {
    let real = tempfile::NamedTempFile::new().unwrap();
    mirage::activate([("/path/to/file", "content")]).unwrap();

    let pending = mirage::bypass(|| mirage::aio::try_exists(real.path()));

    let mut task = tokio_test::task::spawn(pending);
    // Settlement is observed on a later turn, under virtual mode, and the
    // outcome is still the one captured inside the bypass window.
    assert!(mirage::is_active());
    let settled = tokio_test::assert_ready!(task.poll());
    assert!(settled.unwrap());
    assert!(!mirage::fs::exists(real.path()));
    mirage::restore();
}

#[test]
fn nested_bypass_behaves_like_a_single_one() {
    let real = tempfile::NamedTempFile::new().unwrap();
    mirage::activate([("/path/to/file", "content")]).unwrap();

    let nested = mirage::bypass(|| mirage::bypass(|| mirage::fs::exists(real.path())));
    let single = mirage::bypass(|| mirage::fs::exists(real.path()));
    assert_eq!(nested, single);

    // Inner exit must not flip the backend back early.
    mirage::bypass(|| {
        let _ = mirage::bypass(|| ());
        assert!(mirage::fs::exists(real.path()));
    });

    assert!(mirage::fs::exists("/path/to/file"));
    mirage::restore();
}

#[test]
#[should_panic(expected = "bypass requires an active virtual filesystem session")]
fn bypass_without_a_session_panics() {
    mirage::bypass(|| ());
}

#[test]
fn try_bypass_reports_misuse() {
    let err = mirage::try_bypass(|| ()).unwrap_err();
    assert!(matches!(err, mirage::Error::NotActive));

    mirage::activate(mirage::TreeSpec::new()).unwrap();
    let cwd = mirage::try_bypass(|| std::env::current_dir().unwrap()).unwrap();
    assert_eq!(cwd, std::env::current_dir().unwrap());
    mirage::restore();
}
