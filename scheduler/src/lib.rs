mod scheduler_trait;
mod schedulers;

pub use scheduler_trait::{Scheduler, SchedulerFactory};
pub use schedulers::{FifoScheduler, PriorityScheduler};

#[cfg(test)]
mod tests;
