// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn layout_is_namespace_partitioned() {
    let dirs = DataDirs::new("/srv/dagrun", Namespace::default());
    assert_eq!(
        dirs.dag_runs_dir(),
        Path::new("/srv/dagrun/data/ns/37a8/dag-runs")
    );
    assert_eq!(dirs.proc_dir(), Path::new("/srv/dagrun/data/ns/37a8/proc"));
    assert_eq!(dirs.queue_dir(), Path::new("/srv/dagrun/data/ns/37a8/queue"));
    assert_eq!(dirs.dags_dir(), Path::new("/srv/dagrun/dags/37a8"));
    assert_eq!(dirs.logs_dir(), Path::new("/srv/dagrun/logs/ns/37a8"));
}

#[test]
fn services_dir_is_shared_across_namespaces() {
    let a = DataDirs::new("/srv/dagrun", Namespace::default());
    let b = DataDirs::new("/srv/dagrun", Namespace::from_name("prod"));
    assert_eq!(a.services_dir(), b.services_dir());
}

#[test]
fn run_log_dir_uses_safe_name() {
    let dirs = DataDirs::new("/srv/dagrun", Namespace::default());
    assert_eq!(
        dirs.run_log_dir("my dag", "r1"),
        Path::new("/srv/dagrun/logs/ns/37a8/my_dag/r1")
    );
}
