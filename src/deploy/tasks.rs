use super::{quote, DeployError, LdmdConf, RemoteCommand, RemoteShell, Variant};
use crate::configuration::DeploySettings;
use crate::utilities::expand_home;
use futures::future::join_all;

pub const LDM_HOME: &str = "/home/ldm";
pub const LDM_USER: &str = "ldm";
const IFACE_QUERY: &str = "hostname -I | awk '{print $2}'";
const ULIMIT_LINE: &str = "ulimit -c \"unlimited\"";
const PATH_LINE: &str = "export PATH=$PATH:$HOME/util";
const COMPARISON_REPO: &str = "https://github.com/shawnsschen/LDM6-LDM7-comparison.git";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    ClearHome,
    UploadPack,
    InstallPack,
    InstallCtcp,
    InitConfig,
    Start,
    Stop,
    FetchLog,
    PatchSysctl,
    PatchLinkspeed,
    PatchFrcv,
    AddLoss,
    RmLoss,
    Deploy,
}

impl Task {
    pub const ALL: [Task; 14] = [
        Task::ClearHome,
        Task::UploadPack,
        Task::InstallPack,
        Task::InstallCtcp,
        Task::InitConfig,
        Task::Start,
        Task::Stop,
        Task::FetchLog,
        Task::PatchSysctl,
        Task::PatchLinkspeed,
        Task::PatchFrcv,
        Task::AddLoss,
        Task::RmLoss,
        Task::Deploy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Task::ClearHome => "clear-home",
            Task::UploadPack => "upload-pack",
            Task::InstallPack => "install-pack",
            Task::InstallCtcp => "install-ctcp",
            Task::InitConfig => "init-config",
            Task::Start => "start",
            Task::Stop => "stop",
            Task::FetchLog => "fetch-log",
            Task::PatchSysctl => "patch-sysctl",
            Task::PatchLinkspeed => "patch-linkspeed",
            Task::PatchFrcv => "patch-frcv",
            Task::AddLoss => "add-loss",
            Task::RmLoss => "rm-loss",
            Task::Deploy => "deploy",
        }
    }
}

impl std::str::FromStr for Task {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.replace('_', "-").to_ascii_lowercase();
        Task::ALL
            .iter()
            .copied()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| DeployError::UnknownTask(s.to_string()))
    }
}

pub struct Deployer<S> {
    pub settings: DeploySettings,
    pub shell: S,
}

impl<S: RemoteShell> Deployer<S> {
    pub fn new(settings: DeploySettings, shell: S) -> Self {
        Self { settings, shell }
    }

    fn variant(&self) -> Variant {
        self.settings.variant
    }

    async fn exec(&self, host: &str, command: RemoteCommand) -> Result<String, DeployError> {
        match self.shell.run(host, &command).await {
            Ok(output) => Ok(output),
            Err(e) if command.quiet => {
                tracing::warn!(host, error = %e, "ignoring failed quiet command");
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn exec_all(&self, host: &str, commands: Vec<RemoteCommand>) -> Result<(), DeployError> {
        for command in commands {
            self.exec(host, command).await?;
        }
        Ok(())
    }

    // Runs as the ldm user from its home directory.
    fn as_ldm<L: Into<String>>(line: L) -> RemoteCommand {
        RemoteCommand::new(line).cwd(LDM_HOME).sudo(LDM_USER)
    }

    fn src_dir(&self) -> String {
        format!("{}/{}/src", LDM_HOME, self.settings.ldm_version())
    }

    fn receiver_src_dir(&self) -> String {
        format!("{}/mcast_lib/vcmtp/VCMTPv3/receiver", self.src_dir())
    }

    async fn iface(&self, host: &str) -> Result<String, DeployError> {
        Ok(self
            .exec(host, RemoteCommand::new(IFACE_QUERY))
            .await?
            .trim()
            .to_string())
    }

    pub async fn run_task(&self, host: &str, task: Task) -> Result<(), DeployError> {
        tracing::info!(host, task = task.name(), variant = ?self.variant(), "running task");
        match task {
            Task::ClearHome => self.clear_home(host).await,
            Task::UploadPack => self.upload_pack(host).await,
            Task::InstallPack => self.install_pack(host).await,
            Task::InstallCtcp => self.install_ctcp(host).await,
            Task::InitConfig => self.init_config(host).await,
            Task::Start => self.start_ldm(host).await,
            Task::Stop => self.stop_ldm(host).await,
            Task::FetchLog => self.fetch_log(host).await,
            Task::PatchSysctl => self.patch_sysctl(host).await,
            Task::PatchLinkspeed => self.patch_linkspeed(host).await,
            Task::PatchFrcv => self.patch_frcv(host).await,
            Task::AddLoss => self.exec(host, RemoteCommand::new(self.loss_rule("-A"))).await.map(|_| ()),
            Task::RmLoss => self.exec(host, RemoteCommand::new(self.loss_rule("-D"))).await.map(|_| ()),
            Task::Deploy => self.deploy(host).await,
        }
    }

    pub async fn deploy(&self, host: &str) -> Result<(), DeployError> {
        self.clear_home(host).await?;
        self.upload_pack(host).await?;
        self.install_pack(host).await?;
        self.init_config(host).await
    }

    // Also removes the existing product queue.
    pub async fn clear_home(&self, host: &str) -> Result<(), DeployError> {
        self.exec(host, RemoteCommand::new("rm -rf *").cwd(LDM_HOME))
            .await
            .map(|_| ())
    }

    pub async fn upload_pack(&self, host: &str) -> Result<(), DeployError> {
        let pack = self.settings.pack_name();
        let workspace = expand_home(&self.settings.workspace);
        self.shell
            .put(host, &expand_home(&self.settings.pack_path).join(&pack), LDM_HOME, Some(0o664))
            .await?;
        if self.variant() == Variant::Ldm6 {
            self.shell
                .put(host, &workspace.join("CTCP.zip"), "/root", Some(0o664))
                .await?;
        }
        self.shell
            .put(host, &workspace.join("CC-NIE-Toolbox/generic/misc/util"), LDM_HOME, Some(0o664))
            .await?;
        self.exec_all(
            host,
            vec![
                RemoteCommand::new(format!("chown ldm.ldm {}", pack)).cwd(LDM_HOME),
                RemoteCommand::new("chmod +x util/run_ldm util/insert.sh util/cpu_mon.sh util/tc_mon.sh")
                    .cwd(LDM_HOME),
                RemoteCommand::new("chown -R ldm.ldm util").cwd(LDM_HOME),
            ],
        )
        .await
    }

    // Unpacks, configures and builds LDM as the ldm user; root actions run as root.
    pub async fn install_pack(&self, host: &str) -> Result<(), DeployError> {
        let src = self.src_dir();
        self.exec(
            host,
            Self::as_ldm(format!("gunzip -c {} | pax -r '-s:/:/src/:'", self.settings.pack_name())),
        )
        .await?;
        if self.variant() == Variant::Ldm7 {
            self.patch_linkspeed(host).await?;
        }
        let in_src = |line: &str| RemoteCommand::new(line).cwd(&src).sudo(LDM_USER);
        let mut commands = vec![in_src("make distclean").quiet()];
        match self.variant() {
            Variant::Ldm6 => {
                commands.push(in_src(
                    "./configure --with-debug --prefix=/home/ldm --disable-root-actions CFLAGS=-g CXXFLAGS=-g",
                ));
                commands.push(in_src("make install"));
            }
            Variant::Ldm7 => {
                commands.push(in_src("find -exec touch \\{\\} \\;").quiet());
                commands.push(in_src(
                    "./configure --with-debug --with-multicast --disable-root-actions CFLAGS=-g CXXFLAGS=-g",
                ));
                commands.push(in_src("make CXXFLAGS=\"-DDEBUG1\" install"));
            }
        }
        commands.push(RemoteCommand::new("make root-actions").cwd(&src));
        self.exec_all(host, commands).await
    }

    pub fn ctcp_commands(&self) -> Vec<RemoteCommand> {
        let initial = (self.settings.single_bdp() as f64 / 1500.0).ceil() as u64;
        let params = "/sys/module/tcp_ctcp/parameters";
        vec![
            RemoteCommand::new("yum -y install kernel-devel-$(uname -r)"),
            RemoteCommand::new("unzip -o CTCP.zip").cwd("/root"),
            RemoteCommand::new("make").cwd("/root/CTCP"),
            RemoteCommand::new("insmod ./tcp_ctcp.ko").cwd("/root/CTCP").quiet(),
            RemoteCommand::new("sysctl -w net.ipv4.tcp_congestion_control=\"ctcp\""),
            RemoteCommand::new(format!("echo {} > {}/bw", self.settings.tc_rate_mbps, params)),
            RemoteCommand::new(format!("echo {} > {}/initial", initial, params)),
            RemoteCommand::new(format!("echo {} > {}/scale", 120, params)),
        ]
    }

    pub async fn install_ctcp(&self, host: &str) -> Result<(), DeployError> {
        self.exec_all(host, self.ctcp_commands()).await
    }

    // Shapes the sender's outgoing link to the configured rate.
    pub fn traffic_control_commands(&self) -> Vec<RemoteCommand> {
        let iface = &self.settings.iface;
        let rate = self.settings.tc_rate_mbps;
        let lines = match self.variant() {
            Variant::Ldm6 => {
                let receivers = self.settings.receivers();
                vec![
                    format!("tc qdisc del dev {} root", iface),
                    format!(
                        "tc qdisc add dev {} root tbf rate {}mbit burst 50kb limit {}b",
                        iface,
                        rate * receivers,
                        2 * self.settings.single_bdp() * receivers
                    ),
                ]
            }
            Variant::Ldm7 => vec![
                format!("route add 224.0.0.1 dev {}", iface),
                format!("tc qdisc del dev {} root", iface),
                format!("tc qdisc add dev {} root handle 1: htb default 2", iface),
                format!(
                    "tc class add dev {} parent 1: classid 1:1 htb rate {}mbit ceil {}mbit",
                    iface, rate, rate
                ),
                format!("tc qdisc add dev {} parent 1:1 handle 10: bfifo limit 600mb", iface),
                format!(
                    "tc class add dev {} parent 1: classid 1:2 htb rate {}mbit ceil {}mbit",
                    iface, rate, rate
                ),
                format!("tc qdisc add dev {} parent 1:2 handle 11: bfifo limit 600mb", iface),
                format!(
                    "tc filter add dev {} protocol ip parent 1:0 prio 1 u32 match ip dst 224.0.0.1/32 flowid 1:1",
                    iface
                ),
                format!(
                    "tc filter add dev {} protocol ip parent 1:0 prio 1 u32 match ip dst 0/0 flowid 1:2",
                    iface
                ),
            ],
        };
        lines
            .into_iter()
            .map(|l| RemoteCommand::new(l).quiet())
            .collect()
    }

    pub async fn init_config(&self, host: &str) -> Result<(), DeployError> {
        self.exec_all(
            host,
            vec![
                "service ntpd start",
                "service iptables start",
                "yum -y install sysstat",
                "sed -i -e 's/*\\/10/*\\/1/g' /etc/cron.d/sysstat",
                "rm /var/log/sa/*",
                "service crond start",
                "service sysstat start",
            ]
            .into_iter()
            .map(|l| RemoteCommand::new(l).quiet())
            .collect(),
        )
        .await?;

        let iface = self.iface(host).await?;
        let sender_ip = self.settings.sender_ip.clone();
        let conf = if iface == sender_ip {
            tracing::info!(host, %iface, "configuring sender");
            self.exec_all(host, self.traffic_control_commands()).await?;
            self.exec(
                host,
                Self::as_ldm(format!("git clone {}", COMPARISON_REPO)).quiet(),
            )
            .await?;
            if self.variant() == Variant::Ldm6 {
                self.install_ctcp(host).await?;
            }
            self.exec(host, Self::as_ldm("regutil -s 5G /queue/size")).await?;
            LdmdConf::sender(self.variant(), &sender_ip)
        } else {
            tracing::info!(host, %iface, "configuring receiver");
            let queue_size = match self.variant() {
                Variant::Ldm6 => "3G",
                Variant::Ldm7 => "2G",
            };
            self.exec(host, Self::as_ldm(format!("regutil -s {} /queue/size", queue_size)))
                .await?;
            if self.variant() == Variant::Ldm7 {
                self.patch_sysctl(host).await?;
            }
            LdmdConf::receiver(self.variant(), &sender_ip, &iface)
        };

        let bashrc = self.read_or_empty(host, "/home/ldm/.bashrc").await;
        let profile = self.read_or_empty(host, "/home/ldm/.bash_profile").await;
        let mut commands = vec![Self::as_ldm(format!(
            "echo {} > etc/ldmd.conf",
            quote(&conf.to_string())?
        ))];
        if !bashrc.contains(ULIMIT_LINE) {
            commands.push(Self::as_ldm(format!("echo {} >> .bashrc", quote(ULIMIT_LINE)?)));
        }
        if !profile.contains(PATH_LINE) {
            commands.push(Self::as_ldm(format!(
                "echo {} >> .bash_profile",
                quote(PATH_LINE)?
            )));
        }
        commands.push(Self::as_ldm(format!("regutil -s {} /hostname", iface)));
        commands.push(Self::as_ldm("regutil -s 35000 /queue/slots"));
        self.exec_all(host, commands).await
    }

    async fn read_or_empty(&self, host: &str, path: &str) -> String {
        match self.shell.read(host, path).await {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(host, path, error = %e, "could not read remote file");
                String::new()
            }
        }
    }

    pub async fn start_ldm(&self, host: &str) -> Result<(), DeployError> {
        let commands = match self.variant() {
            Variant::Ldm6 => vec![Self::as_ldm("run_ldm ldmd_test")],
            Variant::Ldm7 => vec![
                Self::as_ldm("ldmadmin mkqueue -f"),
                Self::as_ldm("ldmadmin start -v"),
            ],
        };
        self.exec_all(host, commands).await
    }

    pub async fn stop_ldm(&self, host: &str) -> Result<(), DeployError> {
        self.exec(host, Self::as_ldm("ldmadmin stop")).await.map(|_| ())
    }

    // Renames the node's log after its address and copies it, plus the
    // sender's monitor logs, into the local log directory.
    pub async fn fetch_log(&self, host: &str) -> Result<(), DeployError> {
        let iface = self.iface(host).await?;
        let local = expand_home(&self.settings.log_dir);
        tokio::fs::create_dir_all(&local).await?;
        self.exec(
            host,
            RemoteCommand::new(format!("mv ldmd_test.log {}.log", iface)).cwd("/home/ldm/var/logs"),
        )
        .await?;
        self.shell
            .get(host, &format!("/home/ldm/var/logs/{}.log", iface), &local)
            .await?;
        if iface == self.settings.sender_ip {
            self.exec(
                host,
                Self::as_ldm(format!("sar -n DEV | grep {} > bandwidth.log", self.settings.iface)),
            )
            .await?;
            for name in &["cpu_measure.log", "bandwidth.log", "tc_mon.log"] {
                self.shell
                    .get(host, &format!("{}/{}", LDM_HOME, name), &local)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn patch_linkspeed(&self, host: &str) -> Result<(), DeployError> {
        let line = format!(
            "sed -i -e 's/linkspeed(20000000)/linkspeed({})/g' vcmtpRecvv3.cpp",
            self.settings.tc_rate_mbps * 1000 * 1000
        );
        self.exec(
            host,
            RemoteCommand::new(line)
                .cwd(&self.receiver_src_dir())
                .sudo(LDM_USER)
                .quiet(),
        )
        .await
        .map(|_| ())
    }

    pub async fn patch_frcv(&self, host: &str) -> Result<(), DeployError> {
        self.exec(
            host,
            RemoteCommand::new("sed -i -e 's/Frcv 20/Frcv 5/g' vcmtpRecvv3.cpp")
                .cwd(&self.receiver_src_dir())
                .sudo(LDM_USER)
                .quiet(),
        )
        .await
        .map(|_| ())
    }

    pub fn sysctl_commands(&self) -> Vec<RemoteCommand> {
        let (keys, value): (&[&str], u64) = match self.variant() {
            Variant::Ldm6 => (
                &[
                    "net.core.rmem_max",
                    "net.core.wmem_max",
                    "net.core.rmem_default",
                    "net.core.wmem_default",
                ],
                1024 * 1024 * 1024,
            ),
            Variant::Ldm7 => (&["net.core.rmem_max", "net.core.rmem_default"], 2_000_000_000),
        };
        keys.iter()
            .map(|k| RemoteCommand::new(format!("sysctl -w {}={}", k, value)))
            .collect()
    }

    pub async fn patch_sysctl(&self, host: &str) -> Result<(), DeployError> {
        self.exec_all(host, self.sysctl_commands()).await
    }

    // `action` is -A to add the random-drop rule or -D to remove it.
    pub fn loss_rule(&self, action: &str) -> String {
        let protocol = match self.variant() {
            Variant::Ldm6 => "",
            Variant::Ldm7 => " -p udp",
        };
        format!(
            "iptables {} INPUT -i {} -m statistic --mode random --probability {}{} -j DROP",
            action, self.settings.iface, self.settings.loss_rate, protocol
        )
    }
}

// Sequential runs stop at the first failing host; parallel runs report every host.
pub async fn run_on_hosts<S: RemoteShell>(
    deployer: &Deployer<S>,
    hosts: &[String],
    task: Task,
    parallel: bool,
) -> Vec<(String, Result<(), DeployError>)> {
    if parallel {
        return join_all(hosts.iter().map(|host| async move {
            (host.clone(), deployer.run_task(host, task).await)
        }))
        .await;
    }
    let mut results = Vec::new();
    for host in hosts {
        let result = deployer.run_task(host, task).await;
        let failed = result.is_err();
        results.push((host.clone(), result));
        if failed {
            break;
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingShell {
        iface: HashMap<String, String>,
        files: HashMap<String, String>,
        failing: Vec<String>,
        log: Mutex<Vec<String>>,
    }

    impl RecordingShell {
        fn with_iface(host: &str, iface: &str) -> Self {
            let mut shell = Self::default();
            shell.iface.insert(host.to_string(), iface.to_string());
            shell
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteShell for RecordingShell {
        async fn run(&self, host: &str, command: &RemoteCommand) -> Result<String, DeployError> {
            let rendered = command.render()?;
            self.log.lock().unwrap().push(format!("{} run {}", host, command.line));
            if self.failing.iter().any(|f| command.line.contains(f.as_str())) {
                return Err(DeployError::CommandFailed {
                    host: host.to_string(),
                    command: rendered,
                    status: 1,
                    stderr: "failed".to_string(),
                });
            }
            if command.line == IFACE_QUERY {
                return Ok(self.iface.get(host).cloned().unwrap_or_default());
            }
            Ok(String::new())
        }

        async fn put(&self, host: &str, local: &Path, remote_dir: &str, mode: Option<u32>) -> Result<(), DeployError> {
            self.log.lock().unwrap().push(format!(
                "{} put {} {} {:?}",
                host,
                local.file_name().unwrap().to_string_lossy(),
                remote_dir,
                mode
            ));
            Ok(())
        }

        async fn get(&self, host: &str, remote: &str, _local_dir: &Path) -> Result<(), DeployError> {
            self.log.lock().unwrap().push(format!("{} get {}", host, remote));
            Ok(())
        }

        async fn read(&self, _host: &str, remote: &str) -> Result<String, DeployError> {
            self.files
                .get(remote)
                .cloned()
                .ok_or_else(|| DeployError::Io(std::io::ErrorKind::NotFound.into()))
        }
    }

    fn settings(variant: Variant) -> DeploySettings {
        DeploySettings {
            variant,
            log_dir: std::env::temp_dir().join("ldm-toolbox-logs").display().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn task_names_round_trip() {
        for task in Task::ALL.iter() {
            assert_eq!(task.name().parse::<Task>().unwrap(), *task);
        }
        assert_eq!("init_config".parse::<Task>().unwrap(), Task::InitConfig);
        assert!(matches!("reboot".parse::<Task>(), Err(DeployError::UnknownTask(_))));
    }

    #[test]
    fn ldm6_tbf_limit_scales_with_receivers() {
        let mut s = settings(Variant::Ldm6);
        s.receivers = Some(1);
        let deployer = Deployer::new(s, RecordingShell::default());
        let lines: Vec<String> = deployer
            .traffic_control_commands()
            .into_iter()
            .map(|c| c.line)
            .collect();
        assert_eq!(
            lines[1],
            "tc qdisc add dev eth1 root tbf rate 20mbit burst 50kb limit 445000b"
        );
    }

    #[test]
    fn ctcp_initial_window_rounds_up() {
        let deployer = Deployer::new(settings(Variant::Ldm6), RecordingShell::default());
        let commands = deployer.ctcp_commands();
        // 222500 / 1500 = 148.33
        assert!(commands
            .iter()
            .any(|c| c.line == "echo 149 > /sys/module/tcp_ctcp/parameters/initial"));
    }

    #[test]
    fn loss_rule_adds_udp_for_ldm7() {
        let ldm6 = Deployer::new(settings(Variant::Ldm6), RecordingShell::default());
        let ldm7 = Deployer::new(settings(Variant::Ldm7), RecordingShell::default());
        assert_eq!(
            ldm6.loss_rule("-A"),
            "iptables -A INPUT -i eth1 -m statistic --mode random --probability 0.01 -j DROP"
        );
        assert_eq!(
            ldm7.loss_rule("-D"),
            "iptables -D INPUT -i eth1 -m statistic --mode random --probability 0.01 -p udp -j DROP"
        );
    }

    #[tokio::test]
    async fn ldm7_receiver_init_writes_receive_entry() {
        let mut shell = RecordingShell::with_iface("root@10.10.1.2", "10.10.1.2");
        shell
            .files
            .insert("/home/ldm/.bashrc".to_string(), format!("{}\n", ULIMIT_LINE));
        let deployer = Deployer::new(settings(Variant::Ldm7), shell);
        deployer.run_task("root@10.10.1.2", Task::InitConfig).await.unwrap();
        let log = deployer.shell.log();
        assert!(log.iter().any(|l| l.contains("RECEIVE ANY 10.10.1.1 10.10.1.2")));
        assert!(log.iter().any(|l| l.contains("regutil -s 2G /queue/size")));
        assert!(log.iter().any(|l| l.contains("sysctl -w net.core.rmem_max=2000000000")));
        // .bashrc already carries the ulimit line, .bash_profile is missing
        assert!(!log.iter().any(|l| l.contains(">> .bashrc")));
        assert!(log.iter().any(|l| l.contains(">> .bash_profile")));
        assert!(!log.iter().any(|l| l.contains("tc qdisc")));
    }

    #[tokio::test]
    async fn ldm6_sender_init_shapes_traffic_and_installs_ctcp() {
        let shell = RecordingShell::with_iface("root@10.10.1.1", "10.10.1.1");
        let deployer = Deployer::new(settings(Variant::Ldm6), shell);
        deployer.run_task("root@10.10.1.1", Task::InitConfig).await.unwrap();
        let log = deployer.shell.log();
        assert!(log.iter().any(|l| l.contains("tbf rate 20mbit")));
        assert!(log.iter().any(|l| l.contains("insmod ./tcp_ctcp.ko")));
        assert!(log.iter().any(|l| l.contains("ALLOW ANY ^.*$")));
        assert!(log.iter().any(|l| l.contains("regutil -s 5G /queue/size")));
        assert!(log.iter().any(|l| l.contains("regutil -s 10.10.1.1 /hostname")));
    }

    #[tokio::test]
    async fn ldm7_sender_init_routes_multicast_and_writes_multicast_entry() {
        let shell = RecordingShell::with_iface("root@10.10.1.1", "10.10.1.1");
        let deployer = Deployer::new(settings(Variant::Ldm7), shell);
        deployer.run_task("root@10.10.1.1", Task::InitConfig).await.unwrap();
        let log = deployer.shell.log();
        let position = |needle: &str| log.iter().position(|l| l.contains(needle)).unwrap();
        assert!(position("route add 224.0.0.1 dev eth1") < position("htb default 2"));
        assert!(log.iter().any(|l| l.contains("handle 10: bfifo limit 600mb")));
        assert!(log.iter().any(|l| l.contains("handle 11: bfifo limit 600mb")));
        assert!(log
            .iter()
            .any(|l| l.contains("git clone https://github.com/shawnsschen/LDM6-LDM7-comparison.git")));
        assert!(log.iter().any(|l| l.contains("regutil -s 5G /queue/size")));
        assert!(log.iter().any(|l| l.contains("MULTICAST ANY 224.0.0.1:38800 1 10.10.1.1")));
        assert!(position("regutil -s 5G /queue/size") < position("etc/ldmd.conf"));
        assert!(!log.iter().any(|l| l.contains("insmod")));
        assert!(!log.iter().any(|l| l.contains("tbf rate")));
    }

    #[tokio::test]
    async fn quiet_failures_do_not_abort() {
        let mut shell = RecordingShell::with_iface("root@10.10.1.2", "10.10.1.2");
        shell.failing.push("service ntpd start".to_string());
        let deployer = Deployer::new(settings(Variant::Ldm6), shell);
        deployer.run_task("root@10.10.1.2", Task::InitConfig).await.unwrap();
        assert!(deployer
            .shell
            .log()
            .iter()
            .any(|l| l.contains("REQUEST ANY .* 10.10.1.1")));
    }

    #[tokio::test]
    async fn deploy_runs_steps_in_order() {
        let shell = RecordingShell::with_iface("root@10.10.1.2", "10.10.1.2");
        let deployer = Deployer::new(settings(Variant::Ldm7), shell);
        deployer.run_task("root@10.10.1.2", Task::Deploy).await.unwrap();
        let log = deployer.shell.log();
        let position = |needle: &str| log.iter().position(|l| l.contains(needle)).unwrap();
        assert!(position("rm -rf *") < position("put ldm-6.13.2.6.tar.gz"));
        assert!(position("put util /home/ldm Some(436)") > position("put ldm-6.13.2.6.tar.gz"));
        assert!(position("pax -r") < position("make root-actions"));
        assert!(position("make root-actions") < position("etc/ldmd.conf"));
        assert!(!log.iter().any(|l| l.contains("CTCP.zip")));
    }

    #[tokio::test]
    async fn sequential_run_stops_at_first_failure() {
        let mut shell = RecordingShell::default();
        shell.failing.push("ldmadmin stop".to_string());
        let deployer = Deployer::new(settings(Variant::Ldm7), shell);
        let hosts = vec!["root@a".to_string(), "root@b".to_string()];
        let results = run_on_hosts(&deployer, &hosts, Task::Stop, false).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_err());

        let results = run_on_hosts(&deployer, &hosts, Task::Stop, true).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].0, "root@b");
    }

    #[tokio::test]
    async fn fetch_log_pulls_monitor_logs_from_sender() {
        let shell = RecordingShell::with_iface("root@10.10.1.1", "10.10.1.1");
        let deployer = Deployer::new(settings(Variant::Ldm7), shell);
        deployer.run_task("root@10.10.1.1", Task::FetchLog).await.unwrap();
        let log = deployer.shell.log();
        assert!(log.iter().any(|l| l.contains("mv ldmd_test.log 10.10.1.1.log")));
        assert!(log.iter().any(|l| l.ends_with("get /home/ldm/var/logs/10.10.1.1.log")));
        assert!(log.iter().any(|l| l.ends_with("get /home/ldm/tc_mon.log")));
    }
}
