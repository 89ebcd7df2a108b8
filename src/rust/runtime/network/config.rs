// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    device::completion::OverflowPolicy,
    runtime::{
        fail::Fail,
        network::{
            consts,
            types::MacAddress,
        },
    },
};
use ::std::{
    env,
    fs::File,
    io::Read,
    net::Ipv4Addr,
    str::FromStr,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Static network identity handed to the protocol stack at initialization.
mod network_config {
    pub const SECTION_NAME: &str = "network";
    pub const LOCAL_IPV4_ADDR: &str = "local_ipv4_addr";
    pub const NETMASK: &str = "netmask";
    pub const GATEWAY: &str = "gateway";
    pub const LOCAL_LINK_ADDR: &str = "local_link_addr";
    pub const MTU: &str = "mtu";
}

// Data-plane sizing. These only affect the bridge, never the stack.
mod device_config {
    pub const SECTION_NAME: &str = "device";
    pub const DMA_BUFFER_COUNT: &str = "dma_buffer_count";
    pub const DMA_BUFFER_SIZE: &str = "dma_buffer_size";
    pub const RX_QUEUE_CAPACITY: &str = "rx_queue_capacity";
    pub const TX_IN_FLIGHT_MAX: &str = "tx_in_flight_max";
    pub const RX_OVERFLOW_POLICY: &str = "rx_overflow_policy";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Bridge configuration, backed by a YAML document. All options are consumed once at initialization; nothing here is
/// touched on the hot path.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

/// Static IPv4 identity for the link, surfaced to the protocol-stack collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Config {
    pub addr: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        Self::from_yaml_str(&config_s)
    }

    /// Parses a configuration document from a string.
    pub fn from_yaml_str(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(_) => return Err(Fail::new(libc::EINVAL, "could not parse config document")),
        };
        let config_obj: &Yaml = match &config[..] {
            &[ref c] => c,
            _ => return Err(Fail::new(libc::EINVAL, "wrong number of config objects")),
        };

        Ok(Self(config_obj.clone()))
    }

    /// Reads the local IPv4 address parameter from the environment variable first and then the underlying
    /// configuration file.
    pub fn local_ipv4_addr(&self) -> Result<Ipv4Addr, Fail> {
        let local_ipv4_addr: Ipv4Addr =
            self.require_addr(network_config::LOCAL_IPV4_ADDR, "missing local_ipv4_addr")?;
        if local_ipv4_addr.is_unspecified() || local_ipv4_addr.is_broadcast() {
            let cause: &str = "invalid local IPv4 address";
            error!("local_ipv4_addr(): {}", cause);
            return Err(Fail::new(libc::EINVAL, cause));
        }
        Ok(local_ipv4_addr)
    }

    /// Reads the subnet mask for the local link.
    pub fn netmask(&self) -> Result<Ipv4Addr, Fail> {
        self.require_addr(network_config::NETMASK, "missing netmask")
    }

    /// Reads the default gateway for the local link.
    pub fn gateway(&self) -> Result<Ipv4Addr, Fail> {
        self.require_addr(network_config::GATEWAY, "missing gateway")
    }

    /// Reads the full static IPv4 identity.
    pub fn ipv4_config(&self) -> Result<Ipv4Config, Fail> {
        Ok(Ipv4Config {
            addr: self.local_ipv4_addr()?,
            netmask: self.netmask()?,
            gateway: self.gateway()?,
        })
    }

    /// Reads the local link-layer (MAC) address.
    pub fn local_link_addr(&self) -> Result<MacAddress, Fail> {
        self.require_typed_option(
            network_config::SECTION_NAME,
            network_config::LOCAL_LINK_ADDR,
            "missing local_link_addr",
            |val: &str| MacAddress::parse_canonical_str(val).ok(),
        )
    }

    /// Reads the maximum transfer unit reported to the protocol stack.
    pub fn mtu(&self) -> Result<u16, Fail> {
        self.integer_option(network_config::SECTION_NAME, network_config::MTU, consts::DEFAULT_MTU as i64)
            .and_then(|mtu: i64| {
                u16::try_from(mtu).map_err(|_| Fail::new(libc::EINVAL, "mtu does not fit in 16 bits"))
            })
    }

    /// Reads the number of DMA buffers to carve out at initialization.
    pub fn dma_buffer_count(&self) -> Result<usize, Fail> {
        self.sizing_option(device_config::DMA_BUFFER_COUNT, consts::DEFAULT_DMA_BUFFER_COUNT)
    }

    /// Reads the size of a single DMA buffer.
    pub fn dma_buffer_size(&self) -> Result<usize, Fail> {
        self.sizing_option(device_config::DMA_BUFFER_SIZE, consts::DEFAULT_DMA_BUFFER_SIZE)
    }

    /// Reads the capacity of the receive completion queue.
    pub fn rx_queue_capacity(&self) -> Result<usize, Fail> {
        self.sizing_option(device_config::RX_QUEUE_CAPACITY, consts::DEFAULT_RX_QUEUE_CAPACITY)
    }

    /// Reads the bound on concurrently in-flight transmit buffers.
    pub fn tx_in_flight_max(&self) -> Result<usize, Fail> {
        self.sizing_option(device_config::TX_IN_FLIGHT_MAX, consts::DEFAULT_TX_IN_FLIGHT_MAX)
    }

    /// Reads the completion-queue overflow policy. Dropping the incoming frame is the default.
    pub fn rx_overflow_policy(&self) -> Result<OverflowPolicy, Fail> {
        match self.str_option(device_config::SECTION_NAME, device_config::RX_OVERFLOW_POLICY)? {
            None => Ok(OverflowPolicy::DropIncoming),
            Some(ref policy) if policy == "drop-incoming" => Ok(OverflowPolicy::DropIncoming),
            Some(ref policy) if policy == "evict-oldest" => Ok(OverflowPolicy::EvictOldest),
            Some(policy) => {
                let cause: String = format!("unknown rx overflow policy: {:?}", policy);
                error!("rx_overflow_policy(): {}", cause);
                Err(Fail::new(libc::EINVAL, &cause))
            },
        }
    }

    /// Gets a subsection of the configuration document.
    fn get_subsection<'a>(yaml: &'a Yaml, index: &str) -> Option<&'a Yaml> {
        match yaml[index] {
            Yaml::BadValue => None,
            ref subsection => Some(subsection),
        }
    }

    /// Reads an option from the environment. The variable name is the upper-cased option key.
    fn get_typed_env_option<T: FromStr>(key: &str) -> Result<Option<T>, Fail> {
        match env::var(key.to_uppercase()) {
            Ok(value) => match value.parse::<T>() {
                Ok(value) => Ok(Some(value)),
                Err(_) => {
                    let cause: String = format!("could not parse environment override for {}", key);
                    error!("get_typed_env_option(): {}", cause);
                    Err(Fail::new(libc::EINVAL, &cause))
                },
            },
            Err(_) => Ok(None),
        }
    }

    /// Reads a required string option through a parsing function, honoring the environment override.
    fn require_typed_option<T: FromStr>(
        &self,
        section: &str,
        key: &str,
        missing: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, Fail> {
        if let Some(value) = Self::get_typed_env_option(key)? {
            return Ok(value);
        }
        match self.str_option(section, key)? {
            Some(raw) => match parse(&raw) {
                Some(value) => Ok(value),
                None => {
                    let cause: String = format!("could not parse {}", key);
                    error!("require_typed_option(): {}", cause);
                    Err(Fail::new(libc::EINVAL, &cause))
                },
            },
            None => Err(Fail::new(libc::EINVAL, missing)),
        }
    }

    /// Reads a required IPv4 address from the network section.
    fn require_addr(&self, key: &str, missing: &str) -> Result<Ipv4Addr, Fail> {
        self.require_typed_option(network_config::SECTION_NAME, key, missing, |val: &str| val.parse().ok())
    }

    /// Reads an optional string option from a section.
    fn str_option(&self, section: &str, key: &str) -> Result<Option<String>, Fail> {
        let section: &Yaml = match Self::get_subsection(&self.0, section) {
            Some(section) => section,
            None => return Ok(None),
        };
        match section[key] {
            Yaml::BadValue => Ok(None),
            Yaml::String(ref value) => Ok(Some(value.clone())),
            _ => Err(Fail::new(libc::EINVAL, "config option is not a string")),
        }
    }

    /// Reads an optional integer option from a section, with a default.
    fn integer_option(&self, section: &str, key: &str, default: i64) -> Result<i64, Fail> {
        let section: &Yaml = match Self::get_subsection(&self.0, section) {
            Some(section) => section,
            None => return Ok(default),
        };
        match section[key] {
            Yaml::BadValue => Ok(default),
            Yaml::Integer(value) => Ok(value),
            _ => Err(Fail::new(libc::EINVAL, "config option is not an integer")),
        }
    }

    /// Reads a positive sizing option from the device section.
    fn sizing_option(&self, key: &str, default: usize) -> Result<usize, Fail> {
        let value: i64 = self.integer_option(device_config::SECTION_NAME, key, default as i64)?;
        if value <= 0 {
            let cause: String = format!("{} must be positive", key);
            error!("sizing_option(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(value as usize)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
