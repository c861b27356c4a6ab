mod common;

use std::fs;
use std::sync::Arc;

use dlt_core::{
    download_project, download_specs, DownloadTracker, FetchError, FetchResult, RecordType,
    WalkPolicy, INDEX_FILENAME,
};
use dlt_domain::{BundledDependencies, PackageManifest};
use serde_json::json;

use common::{pairs, session, specs, ScriptedSource};

fn results_for<'a>(results: &'a [FetchResult], spec: &str) -> Vec<&'a FetchResult> {
    results.iter().filter(|result| result.spec == spec).collect()
}

#[tokio::test]
async fn shared_dependencies_are_fetched_once() {
    let source = Arc::new(
        ScriptedSource::new()
            .package("a", "1.0.0", &[("c", "^1.0.0")])
            .package("b", "1.0.0", &[("c", "^1.0.0")])
            .package("c", "1.0.0", &[])
            .package("c", "1.4.0", &[]),
    );
    let (_temp, session) = session(&source, WalkPolicy::default());

    let summary = download_specs(&session, &specs(&["a@1.0.0", "b@1.0.0"]))
        .await
        .expect("download");

    assert_eq!(source.fetch_count("c@"), 1);
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.duplicates, 1);
    let c_results = results_for(&summary.results, "c@^1.0.0");
    assert_eq!(c_results.len(), 2);
    assert_eq!(c_results.iter().filter(|result| result.duplicate).count(), 1);

    let tracker = session.into_tracker();
    let record = tracker
        .get_data(RecordType::Semver, "c", "^1")
        .expect("c tracked");
    assert_eq!(record.version.as_deref(), Some("1.4.0"));
    assert!(record.integrity.is_some());
    assert!(!tracker.is_dirty());
}

#[tokio::test]
async fn tracked_specs_are_not_fetched_again() {
    let source = Arc::new(ScriptedSource::new().package("a", "1.0.0", &[]));
    let (_temp, session) = session(&source, WalkPolicy::default());

    download_specs(&session, &specs(&["a@1.0.0"]))
        .await
        .expect("first");
    let again = download_specs(&session, &specs(&["a@^1", "a@1.0.0"]))
        .await
        .expect("second");

    assert_eq!(source.fetch_count("a@"), 1);
    assert!(again.results.iter().all(|result| result.duplicate));
}

#[tokio::test]
async fn implicit_latest_requests_resolve_once_per_session() {
    let source = Arc::new(
        ScriptedSource::new()
            .package("d", "1.0.0", &[])
            .package("d", "2.1.0", &[]),
    );
    let (_temp, session) = session(&source, WalkPolicy::default());

    let summary = download_specs(&session, &specs(&["d", "d@latest", "d@*"]))
        .await
        .expect("download");

    assert_eq!(source.fetches().len(), 1);
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.duplicates, 2);
    assert!(session.with_tracker(|tracker| tracker.contains(RecordType::Semver, "d", "2.1.0")));
    assert!(session.with_tracker(|tracker| tracker.contains(RecordType::Tag, "d", "latest")));
}

#[tokio::test]
async fn dist_tags_are_cross_linked() {
    let source = Arc::new(
        ScriptedSource::new()
            .package("p", "1.0.0", &[])
            .package("p", "2.0.0-rc.1", &[])
            .tag("p", "beta", "1.0.0")
            .tag("p", "stable", "1.0.0")
            .tag("p", "next", "2.0.0-rc.1"),
    );
    let (_temp, session) = session(&source, WalkPolicy::default());

    download_specs(&session, &specs(&["p@beta", "p@next"]))
        .await
        .expect("download");
    // a tag pointing at a tracked version only adds the alias
    let again = download_specs(&session, &specs(&["p@1.0.0", "p@stable"]))
        .await
        .expect("aliases");
    assert_eq!(again.duplicates, 2);

    let tracker = session.into_tracker();
    let beta = tracker.get_data(RecordType::Tag, "p", "beta").expect("beta");
    assert_eq!(beta.version.as_deref(), Some("1.0.0"));
    assert!(tracker.contains(RecordType::Semver, "p", "1.0.0"));
    assert!(tracker.contains(RecordType::Tag, "p", "next"));
    let stable = tracker.get_data(RecordType::Tag, "p", "stable").expect("stable");
    assert_eq!(stable.filename, beta.filename);
    assert_eq!(source.fetch_count("p@"), 2);
}

#[tokio::test]
async fn bundled_dependencies_are_never_fetched() {
    let host = PackageManifest {
        name: Some("host".into()),
        version: Some("1.0.0".into()),
        dependencies: pairs(&[("a", "1.0.0"), ("b", "1.0.0")]),
        bundled_dependencies: Some(BundledDependencies::Names(vec!["a".into()])),
        ..PackageManifest::default()
    };
    let source = Arc::new(
        ScriptedSource::new()
            .manifest(host)
            .package("a", "1.0.0", &[])
            .package("b", "1.0.0", &[]),
    );
    let (_temp, session) = session(&source, WalkPolicy::default());

    let summary = download_specs(&session, &specs(&["host@1.0.0"]))
        .await
        .expect("download");

    assert!(results_for(&summary.results, "a@1.0.0").is_empty());
    assert_eq!(source.fetch_count("a@"), 0);
    assert_eq!(source.fetch_count("b@"), 1);
}

#[tokio::test]
async fn optional_failures_are_tolerated() {
    let host = PackageManifest {
        name: Some("host".into()),
        version: Some("1.0.0".into()),
        optional_dependencies: pairs(&[("x", "1.0.0")]),
        ..PackageManifest::default()
    };
    let source = Arc::new(ScriptedSource::new().manifest(host).failing("x"));
    let (_temp, session) = session(&source, WalkPolicy::default());

    let summary = download_specs(&session, &specs(&["host@1.0.0"]))
        .await
        .expect("optional failure does not abort");

    let x = results_for(&summary.results, "x@1.0.0");
    assert_eq!(x.len(), 1);
    assert!(x[0].failed_optional);
    assert!(x[0].error.as_deref().is_some_and(|error| error.contains("network failure")));
    assert_eq!(summary.failed_optional, 1);
    assert!(session.with_tracker(|tracker| tracker.contains(RecordType::Semver, "host", "1.0.0")));

    let rendered = serde_json::to_value(x[0]).expect("serialize");
    assert_eq!(rendered["spec"], json!("x@1.0.0"));
    assert_eq!(rendered["failedOptional"], json!(true));
}

#[tokio::test]
async fn required_failures_abort_but_the_index_is_still_written() {
    let source = Arc::new(
        ScriptedSource::new()
            .package("needs-x", "1.0.0", &[("x", "1.0.0")])
            .package("fine", "1.0.0", &[])
            .failing("x"),
    );
    let (temp, session) = session(&source, WalkPolicy::default());

    let err = download_specs(&session, &specs(&["needs-x@1.0.0", "fine@1.0.0"]))
        .await
        .expect_err("required failure propagates");
    assert!(format!("{err:#}").contains("network failure"));

    assert!(!session.with_tracker(|tracker| tracker.contains(RecordType::Semver, "needs-x", "1.0.0")));
    assert_eq!(source.fetch_count("needs-x"), 0);
    let reopened = DownloadTracker::open(temp.path()).expect("reopen");
    assert!(reopened.contains(RecordType::Semver, "fine", "1.0.0"));
}

#[tokio::test]
async fn dev_and_peer_policy() {
    let root = PackageManifest {
        name: Some("app".into()),
        version: Some("1.0.0".into()),
        dependencies: pairs(&[("lib", "1.0.0")]),
        dev_dependencies: pairs(&[("tester", "1.0.0")]),
        peer_dependencies: pairs(&[("host", "1.0.0")]),
        ..PackageManifest::default()
    };
    let lib = PackageManifest {
        name: Some("lib".into()),
        version: Some("1.0.0".into()),
        dev_dependencies: pairs(&[("lib-tester", "1.0.0")]),
        ..PackageManifest::default()
    };
    let source = Arc::new(
        ScriptedSource::new()
            .manifest(root)
            .manifest(lib)
            .package("tester", "1.0.0", &[])
            .package("lib-tester", "1.0.0", &[])
            .package("host", "1.0.0", &[]),
    );
    let policy = WalkPolicy {
        include_dev: true,
        no_peer: true,
        ..WalkPolicy::default()
    };
    let (_temp, session) = session(&source, policy);

    download_specs(&session, &specs(&["app@1.0.0"]))
        .await
        .expect("download");

    assert!(source.fetches().contains(&"tester@1.0.0".to_string()));
    assert_eq!(source.fetch_count("lib-tester"), 0);
    assert_eq!(source.fetch_count("host@"), 0);
}

#[tokio::test]
async fn git_remote_forms_share_one_identity() {
    let tool = PackageManifest {
        name: Some("tool".into()),
        version: Some("0.3.0".into()),
        resolved: Some("git+ssh://git@github.com/u/tool.git#9fceb02".into()),
        sha: Some("9fceb02".into()),
        all_refs: Some(vec!["v0.3.0".into()]),
        ..PackageManifest::default()
    };
    let source = Arc::new(ScriptedSource::new().repo("github.com/u/tool", tool));
    let (_temp, session) = session(&source, WalkPolicy::default());

    let summary = download_specs(
        &session,
        &specs(&[
            "github:u/tool#v0.3.0",
            "tool@git+ssh://git@github.com/u/tool.git#v0.3.0",
        ]),
    )
    .await
    .expect("download");
    assert_eq!(source.fetches().len(), 1);
    assert_eq!(summary.duplicates, 1);

    let again = download_specs(&session, &specs(&["git+https://github.com/u/tool.git#9fceb02"]))
        .await
        .expect("download");
    assert!(again.results[0].duplicate);

    // a new branch name resolving to the tracked commit becomes a ref
    let branch = download_specs(&session, &specs(&["github:u/tool#release"]))
        .await
        .expect("download");
    assert!(branch.results[0].duplicate);
    assert_eq!(source.fetches().len(), 1);
    assert!(session.with_tracker(|tracker| {
        tracker.contains(RecordType::Git, "github.com/u/tool", "release")
    }));

    let mut tracker = session.into_tracker();
    let record = tracker
        .get_data(RecordType::Git, "github.com/u/tool", "v0.3.0")
        .expect("ref resolves");
    assert_eq!(record.commit.as_deref(), Some("9fceb02"));
    assert!(tracker.contains(RecordType::Git, "github.com/u/tool", "semver:^0.3.0"));
    assert!(tracker.contains(RecordType::Git, "github.com/u/tool", ""));
    assert!(tracker.audit().is_empty());
}

#[tokio::test]
async fn git_manifest_without_sha_fails() {
    let broken = PackageManifest {
        name: Some("tool".into()),
        resolved: Some("git+https://github.com/u/tool.git".into()),
        ..PackageManifest::default()
    };
    let source = Arc::new(ScriptedSource::new().repo("github.com/u/tool", broken));
    let (_temp, session) = session(&source, WalkPolicy::default());

    let err = download_specs(&session, &specs(&["github:u/tool"]))
        .await
        .expect_err("missing sha");
    assert!(format!("{err:#}").contains("_sha"));
}

#[tokio::test]
async fn url_tarballs_are_keyed_without_scheme() {
    let remote = PackageManifest {
        name: Some("remote".into()),
        version: Some("1.0.0".into()),
        resolved: Some("https://cdn.example.com/remote-1.0.0.tgz".into()),
        dependencies: pairs(&[("c", "1.0.0")]),
        ..PackageManifest::default()
    };
    let source = Arc::new(
        ScriptedSource::new()
            .url("https://cdn.example.com/remote-1.0.0.tgz", remote)
            .package("c", "1.0.0", &[]),
    );
    let (_temp, session) = session(&source, WalkPolicy::default());

    download_specs(&session, &specs(&["https://cdn.example.com/remote-1.0.0.tgz"]))
        .await
        .expect("download");

    assert_eq!(source.fetches().len(), 2);
    session.with_tracker(|tracker| {
        assert!(tracker.contains(RecordType::Url, "", "http://cdn.example.com/remote-1.0.0.tgz"));
        assert!(!tracker.contains(RecordType::Url, "remote", "https://cdn.example.com/remote-1.0.0.tgz"));
    });
}

#[tokio::test]
async fn manifests_without_resolved_are_rejected() {
    let source = Arc::new(ScriptedSource::new().url(
        "https://cdn.example.com/anon.tgz",
        PackageManifest::default(),
    ));
    let (_temp, session) = session(&source, WalkPolicy::default());

    let err = download_specs(&session, &specs(&["https://cdn.example.com/anon.tgz"]))
        .await
        .expect_err("no _resolved");
    let cause = err.downcast_ref::<FetchError>().expect("typed cause");
    assert_eq!(cause.code(), "EBADRESOLVED");
    assert!(source.fetches().is_empty());
}

#[tokio::test]
async fn project_lockfile_is_walked_without_recursion() {
    let source = Arc::new(
        ScriptedSource::new()
            .package("a", "1.0.0", &[("c", "^1.0.0")])
            .package("c", "1.0.0", &[])
            .package("c", "1.9.0", &[])
            .package("dev-tool", "2.0.0", &[]),
    );
    let (_temp, session) = session(&source, WalkPolicy::default());

    let project = tempfile::tempdir().expect("project dir");
    fs::write(
        project.path().join("package.json"),
        json!({
            "name": "app",
            "version": "0.0.0",
            "dependencies": {"a": "^1.0.0"},
            "devDependencies": {"dev-tool": "^2.0.0"}
        })
        .to_string(),
    )
    .expect("write manifest");
    fs::write(
        project.path().join("package-lock.json"),
        json!({
            "name": "app",
            "lockfileVersion": 3,
            "packages": {
                "": {"name": "app", "version": "0.0.0"},
                "node_modules/a": {"version": "1.0.0"},
                "node_modules/c": {"version": "1.0.0"},
                "node_modules/dev-tool": {"version": "2.0.0", "dev": true}
            }
        })
        .to_string(),
    )
    .expect("write lockfile");

    let summary = download_project(&session, project.path())
        .await
        .expect("download project");

    assert_eq!(summary.fetched, 2);
    assert_eq!(source.fetch_count("c@1.0.0"), 1);
    assert_eq!(source.fetch_count("c@"), 1);
    assert_eq!(source.fetch_count("dev-tool"), 0);
}

#[tokio::test]
async fn project_without_lockfile_walks_the_manifest() {
    let source = Arc::new(
        ScriptedSource::new()
            .package("a", "1.0.0", &[("c", "^1.0.0")])
            .package("c", "1.2.0", &[]),
    );
    let (_temp, session) = session(&source, WalkPolicy::default());

    let project = tempfile::tempdir().expect("project dir");
    fs::write(
        project.path().join("package.json"),
        json!({"name": "app", "dependencies": {"a": "^1.0.0"}}).to_string(),
    )
    .expect("write manifest");

    let summary = download_project(&session, project.path())
        .await
        .expect("download project");
    assert_eq!(summary.fetched, 2);
    assert_eq!(source.fetch_count("c@^1.0.0"), 1);
}

#[tokio::test]
async fn index_can_be_reconstructed_from_fetched_tarballs() {
    let tool = PackageManifest {
        name: Some("tool".into()),
        version: Some("0.3.0".into()),
        resolved: Some("git+https://gitlab.com/team/tool.git#c0ffee".into()),
        sha: Some("c0ffee".into()),
        ..PackageManifest::default()
    };
    let source = Arc::new(
        ScriptedSource::new()
            .package("@scope/pkg", "3.1.4", &[])
            .repo("gitlab.com/team/tool", tool),
    );
    let (temp, session) = session(&source, WalkPolicy::default());

    download_specs(&session, &specs(&["@scope/pkg@^3", "gitlab:team/tool"]))
        .await
        .expect("download");
    fs::remove_file(temp.path().join(INDEX_FILENAME)).expect("remove index");

    let rebuilt = DownloadTracker::open(temp.path()).expect("reopen");
    assert!(rebuilt.is_dirty());
    assert!(rebuilt.contains(RecordType::Semver, "@scope/pkg", "3.1.4"));
    assert!(rebuilt.contains(RecordType::Git, "gitlab.com/team/tool", "c0ffee"));
}
