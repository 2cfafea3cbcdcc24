pub mod sleeplock;
