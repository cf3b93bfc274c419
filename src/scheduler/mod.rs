pub mod pool;
pub mod semaphore;

pub use pool::{
    do_parallel_for, do_parallel_tasks, set_num_threads, shutdown_thread_pool, Task, ThreadPool,
};
pub use semaphore::Semaphore;
