pub mod assignment;
pub mod audit;
pub mod employee;
pub mod invitation;
pub mod kiosk;
pub mod profile;
pub mod time_entry;

pub use assignment::{
    Assignment, CreateAssignmentInput, SchedulePreviewInput, SchedulePreviewResponse, TerminateAssignmentInput,
    TerminationKind, UpdateAssignmentInput,
};
pub use audit::{AuditAction, AuditEntry};
pub use employee::{
    CreateEmployeeInput, Employee, FaceEnrollmentInput, GeneratedPinResponse, NextEmployeeNumberResponse,
    UpdateEmployeeInput,
};
pub use invitation::{
    CreateInvitationInput, CreatedInvitation, Invitation, InvitationMutationResponse, InvitationVerifyResponse,
};
pub use kiosk::{
    ConfigureKioskInput, CreateKioskInput, Kiosk, KioskDeviceConfig, KioskPunchInput, KioskPunchResponse,
    KioskStatusResponse, KioskUrlResponse, UpdateKioskInput,
};
pub use profile::{Dealership, DealershipMembership, MeResponse, Profile};
pub use time_entry::{
    AdjustTimeEntryInput, TimeEntry, TimeEntryMutationResponse, TimeEntryWithEmployee, TimecardRow,
};
