//! Builtin terminology for industrial automation software.

/// A compiled-in glossary term
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuiltinTerm {
    pub source: &'static str,
    pub target: &'static str,
    pub category: &'static str,
    pub confidence: f64,
}

const fn term(source: &'static str, target: &'static str, category: &'static str) -> BuiltinTerm {
    BuiltinTerm {
        source,
        target,
        category,
        confidence: 1.0,
    }
}

/// Seeded into every store at construction (insert-if-absent)
pub const BUILTIN_TERMS: &[BuiltinTerm] = &[
    // Basic automation
    term("启动", "Start", "automation"),
    term("停止", "Stop", "automation"),
    term("暂停", "Pause", "automation"),
    term("复位", "Reset", "automation"),
    term("报警", "Alarm", "automation"),
    term("故障", "Fault", "automation"),
    term("运行", "Run", "automation"),
    term("手动", "Manual", "automation"),
    term("自动", "Auto", "automation"),
    // PLC
    term("程序", "Program", "plc"),
    term("下载", "Download", "plc"),
    term("上传", "Upload", "plc"),
    term("监控", "Monitor", "plc"),
    term("调试", "Debug", "plc"),
    term("仿真", "Simulation", "plc"),
    // Motor / servo
    term("伺服", "Servo", "motor"),
    term("电机", "Motor", "motor"),
    term("速度", "Speed", "motor"),
    term("位置", "Position", "motor"),
    term("扭矩", "Torque", "motor"),
    term("编码器", "Encoder", "motor"),
    // HMI
    term("界面", "Interface", "hmi"),
    term("画面", "Screen", "hmi"),
    term("按钮", "Button", "hmi"),
    term("指示灯", "Indicator", "hmi"),
    term("数值", "Value", "hmi"),
    // Common UI
    term("确定", "OK", "ui"),
    term("取消", "Cancel", "ui"),
    term("设置", "Settings", "ui"),
    term("配置", "Configuration", "ui"),
    term("参数", "Parameter", "ui"),
    term("选项", "Option", "ui"),
    term("菜单", "Menu", "ui"),
    term("工具", "Tools", "ui"),
    term("帮助", "Help", "ui"),
    term("关于", "About", "ui"),
];

const AUTOMATION: &[BuiltinTerm] = &[
    term("自动化", "Automation", "automation"),
    term("控制系统", "Control System", "automation"),
    term("传感器", "Sensor", "automation"),
    term("执行器", "Actuator", "automation"),
    term("反馈", "Feedback", "automation"),
    term("设定值", "Setpoint", "automation"),
    term("过程变量", "Process Variable", "automation"),
    term("控制器", "Controller", "automation"),
    term("调节器", "Regulator", "automation"),
    term("开环控制", "Open Loop Control", "automation"),
    term("闭环控制", "Closed Loop Control", "automation"),
];

const ROBOTICS: &[BuiltinTerm] = &[
    term("机器人", "Robot", "robotics"),
    term("机械臂", "Robotic Arm", "robotics"),
    term("关节", "Joint", "robotics"),
    term("连杆", "Link", "robotics"),
    term("末端执行器", "End Effector", "robotics"),
    term("工作空间", "Workspace", "robotics"),
    term("自由度", "Degrees of Freedom", "robotics"),
    term("运动学", "Kinematics", "robotics"),
    term("动力学", "Dynamics", "robotics"),
    term("轨迹规划", "Trajectory Planning", "robotics"),
    term("路径规划", "Path Planning", "robotics"),
    term("示教", "Teaching", "robotics"),
    term("再现", "Playback", "robotics"),
];

const PLC: &[BuiltinTerm] = &[
    term("可编程控制器", "Programmable Logic Controller", "plc"),
    term("梯形图", "Ladder Logic", "plc"),
    term("指令表", "Instruction List", "plc"),
    term("功能块", "Function Block", "plc"),
    term("结构化文本", "Structured Text", "plc"),
    term("顺序功能图", "Sequential Function Chart", "plc"),
    term("输入模块", "Input Module", "plc"),
    term("输出模块", "Output Module", "plc"),
    term("模拟量", "Analog", "plc"),
    term("数字量", "Digital", "plc"),
    term("扫描周期", "Scan Cycle", "plc"),
    term("看门狗", "Watchdog", "plc"),
];

const HMI: &[BuiltinTerm] = &[
    term("人机界面", "Human Machine Interface", "hmi"),
    term("触摸屏", "Touch Screen", "hmi"),
    term("画面", "Screen", "hmi"),
    term("控件", "Control", "hmi"),
    term("按钮", "Button", "hmi"),
    term("指示灯", "Indicator", "hmi"),
    term("文本框", "Text Box", "hmi"),
    term("数值输入", "Numeric Input", "hmi"),
    term("趋势图", "Trend Chart", "hmi"),
    term("报警显示", "Alarm Display", "hmi"),
    term("历史数据", "Historical Data", "hmi"),
    term("配方", "Recipe", "hmi"),
];

/// Names accepted by [`domain_vocabulary`]
pub const DOMAINS: &[&str] = &["automation", "robotics", "plc", "hmi"];

/// Optional domain-specific vocabulary, seeded on demand
pub fn domain_vocabulary(domain: &str) -> &'static [BuiltinTerm] {
    match domain {
        "automation" => AUTOMATION,
        "robotics" => ROBOTICS,
        "plc" => PLC,
        "hmi" => HMI,
        _ => &[],
    }
}
