//! Named access declarations used by the routes.

use crate::auth::Role;
use crate::gateway::scope::Access;

/// Students living in hostel accommodation carry this tag.
pub const HOSTEL_RESIDENT_TAG: &str = "hostel_resident";

/// A compile-time access declaration for a route.
pub trait Policy: Send + Sync + 'static {
    const ACCESS: Access;
}

macro_rules! policy {
    ($(#[$meta:meta])* $name:ident => $access:expr) => {
        $(#[$meta])*
        pub struct $name;

        impl Policy for $name {
            const ACCESS: Access = $access;
        }
    };
}

policy!(Accountant => Access::unscoped(&[Role::Accountant]));

policy!(
    /// HOD endpoints only ever see the HOD's own department.
    HodDepartment => Access::department(&[Role::Hod])
);

policy!(HostelWarden => Access::unscoped(&[Role::Hostel]));

policy!(
    /// Hostel staff may only see students tagged as residents.
    HostelResidents => Access::tagged(&[Role::Hostel], HOSTEL_RESIDENT_TAG)
);

policy!(Librarian => Access::unscoped(&[Role::Librarian]));

policy!(Placement => Access::unscoped(&[Role::Tnp]));

policy!(
    /// Any authority with an active profile.
    AnyAuthority => Access::unscoped(&Role::ALL)
);

policy!(
    /// Self-service edits of the caller's own profile.
    OwnProfile => Access::own_record(&Role::ALL)
);
