pub mod checkout;
pub mod order_service;
pub mod order_writer;
pub mod payment;
pub mod reservation;

pub use checkout::{CheckoutService, CheckoutStage};
pub use order_service::OrderService;
pub use order_writer::OrderWriter;
pub use payment::{ChargeOutcome, ChargeRequest, PaymentGateway, PaymentService};
pub use reservation::{Reservation, ReservationEngine};
