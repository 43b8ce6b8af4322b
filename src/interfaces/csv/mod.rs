pub mod balance_writer;
pub mod task_reader;
