pub mod ethers_provider;
