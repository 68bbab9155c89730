//! Boot event triggers.

use crate::context::Context;
use crate::report::StageReport;
use crate::stage;

/// Boot event delivered by init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootEvent {
    PostFsData,
    Services,
    BootCompleted,
}

/// Dispatch a boot event. Never fails: problems are logged in the report.
///
/// `credential` is forwarded untouched; checking it is not apd's business.
pub fn cmd_event(ctx: &Context<'_>, event: BootEvent, credential: &str) -> StageReport {
    let report = match event {
        BootEvent::PostFsData => stage::on_post_fs_data(ctx, credential),
        BootEvent::Services => stage::on_services(ctx, credential),
        BootEvent::BootCompleted => stage::on_boot_completed(ctx, credential),
    };
    report.log_summary();
    report
}
