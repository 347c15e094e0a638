pub mod availability;
pub mod referral;

pub use availability::AvailabilityService;
pub use referral::ReferralResolver;
