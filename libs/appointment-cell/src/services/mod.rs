pub mod reservation;
pub mod views;

pub use reservation::ReservationService;
pub use views::ReservationViewService;
