pub mod collection_reader;
pub mod report_writer;
