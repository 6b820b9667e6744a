pub mod frame_loop;
