// Data models for the queue backend's JSON payloads
//
// Only the fields the client reads are typed. Queue records additionally keep
// any unknown server fields so an update can send the record back unchanged.

pub mod queue;
pub mod report;
pub mod service;
pub mod user;

pub use queue::{AvailableNumber, NewQueue, Queue, QueueService, Ticket, Waitlist};
pub use report::MonthlyTickets;
pub use service::{NewService, Service};
pub use user::{Client, Gender, NewClient, User, UserRole};
