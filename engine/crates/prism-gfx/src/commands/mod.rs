pub mod command_buffer;
